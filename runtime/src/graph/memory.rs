use std::{
    collections::{BTreeSet, HashMap},
    path::PathBuf,
};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::storage::io::{ensure_parent_dir, load_or_default, write_json_file};

use super::model::{
    BatchOutcome, DocumentGraph, DocumentNode, EdgeKey, EntityKey, EntityMergeOutcome, EntityNode,
    GraphStatement, RelationshipEdge, ReviewChange, WriteBatch,
};
use super::store::GraphStore;

#[derive(Clone, Debug)]
pub struct MemoryGraphStoreConfig {
    pub working_dir: PathBuf,
    pub namespace: String,
    pub workspace: Option<String>,
}

/// In-process graph store persisted as a single JSON document.
///
/// A transaction stages its statements against a copy of the graph, writes
/// the copy to disk and only then swaps it in, so a failed statement or a
/// failed write leaves both memory and disk unchanged.
pub struct MemoryGraphStore {
    final_namespace: String,
    file_path: PathBuf,
    state: RwLock<GraphState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphData {
    #[serde(default)]
    entities: HashMap<String, EntityNode>,
    #[serde(default)]
    documents: HashMap<String, DocumentNode>,
    #[serde(default)]
    relationships: HashMap<String, RelationshipEdge>,
    /// (entity_id, document_id) pairs.
    #[serde(default)]
    extracted_from: BTreeSet<(String, String)>,
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    data: GraphData,
    entity_index: HashMap<EntityKey, String>,
    edge_index: HashMap<EdgeKey, String>,
}

impl GraphState {
    fn from_data(data: GraphData) -> Self {
        let mut state = Self {
            data,
            ..Self::default()
        };
        state.reindex();
        state
    }

    /// Rebuilds lookup tables. When legacy duplicates share a key the oldest
    /// node is the one merges resolve to.
    fn reindex(&mut self) {
        let mut entities: Vec<&EntityNode> = self.data.entities.values().collect();
        entities.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        self.entity_index.clear();
        for entity in entities {
            self.entity_index
                .entry(entity.key())
                .or_insert_with(|| entity.id.clone());
        }

        let mut edges: Vec<&RelationshipEdge> = self.data.relationships.values().collect();
        edges.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        self.edge_index.clear();
        for edge in edges {
            self.edge_index
                .entry(edge.key())
                .or_insert_with(|| edge.id.clone());
        }
    }

    fn resolve_entity(&self, key: &EntityKey) -> Result<String> {
        self.entity_index
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("entity ({}, {}) not merged before use", key.name, key.entity_type))
    }

    fn execute(&mut self, statement: GraphStatement, now: DateTime<Utc>, outcome: &mut BatchOutcome) -> Result<()> {
        match statement {
            GraphStatement::MergeEntity(upsert) => {
                match self.entity_index.get(&upsert.key) {
                    Some(id) => {
                        let node = self
                            .data
                            .entities
                            .get_mut(id)
                            .ok_or_else(|| anyhow!("entity index points at missing node {id}"))?;
                        node.absorb(&upsert);
                        outcome.entities_merged += 1;
                    }
                    None => {
                        let node = EntityNode::create(&upsert, now);
                        self.entity_index.insert(upsert.key.clone(), node.id.clone());
                        self.data.entities.insert(node.id.clone(), node);
                        outcome.entities_created += 1;
                    }
                }
            }
            GraphStatement::MergeDocument(upsert) => match self.data.documents.get_mut(&upsert.id) {
                Some(document) => document.absorb(&upsert, now),
                None => {
                    self.data
                        .documents
                        .insert(upsert.id.clone(), DocumentNode::create(&upsert, now));
                    outcome.documents_created += 1;
                }
            },
            GraphStatement::LinkExtractedFrom {
                entity,
                document_id,
            } => {
                if !self.data.documents.contains_key(&document_id) {
                    bail!("document {document_id} not merged before linking");
                }
                let entity_id = self.resolve_entity(&entity)?;
                self.data.extracted_from.insert((entity_id, document_id));
            }
            GraphStatement::MergeRelationship(upsert) => {
                let key = EdgeKey {
                    subject_id: self.resolve_entity(&upsert.subject)?,
                    relation_type: upsert.relation_type.clone(),
                    object_id: self.resolve_entity(&upsert.object)?,
                };
                match self.edge_index.get(&key) {
                    Some(id) => {
                        let edge = self
                            .data
                            .relationships
                            .get_mut(id)
                            .ok_or_else(|| anyhow!("edge index points at missing edge {id}"))?;
                        edge.absorb(&upsert);
                        outcome.relationships_merged += 1;
                    }
                    None => {
                        let edge = RelationshipEdge::create(
                            &upsert,
                            key.subject_id.clone(),
                            key.object_id.clone(),
                            now,
                        );
                        self.edge_index.insert(key, edge.id.clone());
                        self.data.relationships.insert(edge.id.clone(), edge);
                        outcome.relationships_created += 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn merge_entities(&mut self, survivor_id: &str, absorbed: &[String]) -> Result<EntityMergeOutcome> {
        let mut survivor = self
            .data
            .entities
            .remove(survivor_id)
            .ok_or_else(|| anyhow!("entity {survivor_id} does not exist"))?;

        let mut outcome = EntityMergeOutcome {
            survivor_id: survivor_id.to_string(),
            ..EntityMergeOutcome::default()
        };

        for id in absorbed {
            if id == survivor_id {
                continue;
            }
            let node = self
                .data
                .entities
                .remove(id)
                .ok_or_else(|| anyhow!("entity {id} does not exist"))?;
            survivor.combine(node);
            outcome.entities_removed += 1;
        }
        self.data.entities.insert(survivor.id.clone(), survivor);

        let is_absorbed = |id: &str| id != survivor_id && absorbed.iter().any(|a| a == id);

        self.data.extracted_from = std::mem::take(&mut self.data.extracted_from)
            .into_iter()
            .map(|(entity_id, document_id)| {
                if is_absorbed(&entity_id) {
                    (survivor_id.to_string(), document_id)
                } else {
                    (entity_id, document_id)
                }
            })
            .collect();

        let mut edges: Vec<RelationshipEdge> =
            std::mem::take(&mut self.data.relationships).into_values().collect();
        edges.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let mut by_key: HashMap<EdgeKey, String> = HashMap::new();
        for mut edge in edges {
            let mut moved = false;
            if is_absorbed(&edge.subject_id) {
                edge.subject_id = survivor_id.to_string();
                moved = true;
            }
            if is_absorbed(&edge.object_id) {
                edge.object_id = survivor_id.to_string();
                moved = true;
            }
            if moved {
                outcome.relationships_repointed += 1;
            }

            match by_key.get(&edge.key()) {
                Some(existing_id) => {
                    let existing = self
                        .data
                        .relationships
                        .get_mut(existing_id)
                        .ok_or_else(|| anyhow!("edge {existing_id} vanished during merge"))?;
                    existing.combine(edge);
                    outcome.relationships_combined += 1;
                }
                None => {
                    by_key.insert(edge.key(), edge.id.clone());
                    self.data.relationships.insert(edge.id.clone(), edge);
                }
            }
        }

        self.reindex();
        Ok(outcome)
    }
}

impl MemoryGraphStore {
    pub fn new(config: MemoryGraphStoreConfig) -> Self {
        let MemoryGraphStoreConfig {
            working_dir,
            namespace,
            workspace,
        } = config;

        let (workspace_prefix, workspace_dir) = match workspace.as_deref() {
            Some(ws) if !ws.is_empty() => (ws.to_string(), working_dir.join(ws)),
            _ => ("_".to_string(), working_dir.clone()),
        };

        let final_namespace = format!("{}_{}", workspace_prefix, namespace);
        let file_path = workspace_dir.join(format!("graph_store_{}.json", namespace));

        Self {
            final_namespace,
            file_path,
            state: RwLock::new(GraphState::default()),
        }
    }

    async fn persist(&self, data: &GraphData) -> Result<()> {
        write_json_file(&self.file_path, data)
            .await
            .with_context(|| format!("failed to write graph store {}", self.final_namespace))
    }

    /// Runs `mutate` against a staged copy and commits it only when both the
    /// mutation and the disk write succeed.
    async fn transact<T, F>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut GraphState) -> Result<T>,
    {
        let mut guard = self.state.write().await;
        let mut staged = guard.clone();
        let value = mutate(&mut staged)?;
        self.persist(&staged.data).await?;
        *guard = staged;
        Ok(value)
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn initialize(&self) -> Result<()> {
        ensure_parent_dir(&self.file_path).await?;
        let data: GraphData = load_or_default(&self.file_path)
            .await
            .with_context(|| format!("failed to load graph store {}", self.final_namespace))?;
        *self.state.write().await = GraphState::from_data(data);
        Ok(())
    }

    async fn finalize(&self) -> Result<()> {
        let guard = self.state.read().await;
        self.persist(&guard.data).await
    }

    async fn apply(&self, batch: WriteBatch) -> Result<BatchOutcome> {
        if batch.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let statements = batch.len();
        let outcome = self
            .transact(|state| {
                let now = Utc::now();
                let mut outcome = BatchOutcome::default();
                for (position, statement) in batch.statements.into_iter().enumerate() {
                    state
                        .execute(statement, now, &mut outcome)
                        .with_context(|| format!("statement {position} failed"))?;
                }
                Ok(outcome)
            })
            .await?;

        debug!(namespace = %self.final_namespace, statements, "graph batch committed");
        Ok(outcome)
    }

    async fn entities(&self) -> Result<Vec<EntityNode>> {
        let guard = self.state.read().await;
        Ok(guard.data.entities.values().cloned().collect())
    }

    async fn entities_by_ids(&self, ids: &[String]) -> Result<Vec<Option<EntityNode>>> {
        let guard = self.state.read().await;
        Ok(ids
            .iter()
            .map(|id| guard.data.entities.get(id).cloned())
            .collect())
    }

    async fn relationship(&self, id: &str) -> Result<Option<RelationshipEdge>> {
        let guard = self.state.read().await;
        Ok(guard.data.relationships.get(id).cloned())
    }

    async fn relationships(&self) -> Result<Vec<RelationshipEdge>> {
        let guard = self.state.read().await;
        Ok(guard.data.relationships.values().cloned().collect())
    }

    async fn review_relationship(
        &self,
        id: &str,
        change: ReviewChange,
    ) -> Result<Option<RelationshipEdge>> {
        self.transact(|state| {
            Ok(state.data.relationships.get_mut(id).map(|edge| {
                edge.apply_review(&change);
                edge.clone()
            }))
        })
        .await
    }

    async fn merge_entities(&self, survivor: &str, absorbed: &[String]) -> Result<EntityMergeOutcome> {
        self.transact(|state| state.merge_entities(survivor, absorbed))
            .await
    }

    async fn document_graph(&self, document_id: &str) -> Result<Option<DocumentGraph>> {
        let guard = self.state.read().await;
        let Some(document) = guard.data.documents.get(document_id) else {
            return Ok(None);
        };

        let entities = guard
            .data
            .extracted_from
            .iter()
            .filter(|(_, doc)| doc == document_id)
            .filter_map(|(entity_id, _)| guard.data.entities.get(entity_id).cloned())
            .collect();

        let relationships = guard
            .data
            .relationships
            .values()
            .filter(|edge| edge.sources.iter().any(|source| source == document_id))
            .cloned()
            .collect();

        Ok(Some(DocumentGraph {
            document: document.clone(),
            entities,
            relationships,
        }))
    }

    async fn import_raw(
        &self,
        entities: Vec<EntityNode>,
        relationships: Vec<RelationshipEdge>,
    ) -> Result<()> {
        self.transact(|state| {
            for edge in &relationships {
                for endpoint in [&edge.subject_id, &edge.object_id] {
                    let known = state.data.entities.contains_key(endpoint)
                        || entities.iter().any(|e| &e.id == endpoint);
                    if !known {
                        bail!("edge {} references unknown entity {endpoint}", edge.id);
                    }
                }
            }
            for entity in entities {
                state.data.entities.insert(entity.id.clone(), entity);
            }
            for edge in relationships {
                state.data.relationships.insert(edge.id.clone(), edge);
            }
            state.reindex();
            Ok(())
        })
        .await
    }
}
