use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{IngestError, IngestResult};

use super::{
    model::{EntityKey, EntityMergeOutcome, EntityNode},
    store::GraphStore,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub name: String,
    pub entity_type: String,
    /// Oldest first; the first id survives a merge.
    pub entity_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationSummary {
    pub groups_merged: usize,
    pub entities_removed: usize,
    pub relationships_repointed: usize,
    pub relationships_combined: usize,
}

impl ConsolidationSummary {
    fn record(&mut self, outcome: &EntityMergeOutcome) {
        self.groups_merged += 1;
        self.entities_removed += outcome.entities_removed;
        self.relationships_repointed += outcome.relationships_repointed;
        self.relationships_combined += outcome.relationships_combined;
    }
}

/// Merges entity nodes that describe the same `(name, type)`.
///
/// The merge key on the write path should prevent such duplicates, but data
/// imported before the key was enforced can still carry them.
pub struct Consolidator {
    store: Arc<dyn GraphStore>,
}

impl Consolidator {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Read-only report of duplicate groups.
    pub async fn find_duplicate_entities(&self) -> IngestResult<Vec<DuplicateGroup>> {
        let entities = self
            .store
            .entities()
            .await
            .map_err(|err| IngestError::store(&err))?;
        Ok(group_duplicates(entities))
    }

    pub async fn consolidate_identical_entities(&self) -> IngestResult<ConsolidationSummary> {
        let groups = self.find_duplicate_entities().await?;
        let mut summary = ConsolidationSummary::default();

        for group in groups {
            let (survivor, absorbed) = group
                .entity_ids
                .split_first()
                .ok_or_else(|| IngestError::InvalidRequest("empty duplicate group".into()))?;
            let outcome = self
                .store
                .merge_entities(survivor, absorbed)
                .await
                .map_err(|err| IngestError::store(&err))?;
            debug!(
                name = %group.name,
                entity_type = %group.entity_type,
                survivor = %outcome.survivor_id,
                removed = outcome.entities_removed,
                "merged duplicate entities"
            );
            summary.record(&outcome);
        }

        Ok(summary)
    }

    /// Merges caller-chosen nodes into the first id of the list.
    pub async fn merge_specific_entities(&self, ids: &[String]) -> IngestResult<ConsolidationSummary> {
        let mut unique: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(id.clone());
            }
        }
        if unique.len() < 2 {
            return Err(IngestError::InvalidRequest(
                "at least two distinct entity ids are required to merge".into(),
            ));
        }

        let found = self
            .store
            .entities_by_ids(&unique)
            .await
            .map_err(|err| IngestError::store(&err))?;
        if let Some((missing, _)) = unique.iter().zip(&found).find(|(_, node)| node.is_none()) {
            return Err(IngestError::not_found("entity", missing.clone()));
        }

        let outcome = self
            .store
            .merge_entities(&unique[0], &unique[1..])
            .await
            .map_err(|err| IngestError::store(&err))?;
        info!(
            survivor = %outcome.survivor_id,
            removed = outcome.entities_removed,
            "manual entity merge completed"
        );

        let mut summary = ConsolidationSummary::default();
        summary.record(&outcome);
        Ok(summary)
    }
}

fn group_duplicates(entities: Vec<EntityNode>) -> Vec<DuplicateGroup> {
    let mut groups: HashMap<EntityKey, Vec<EntityNode>> = HashMap::new();
    for entity in entities {
        groups.entry(entity.key()).or_default().push(entity);
    }

    let mut duplicates: Vec<DuplicateGroup> = groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(key, mut members)| {
            members.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
            DuplicateGroup {
                name: key.name,
                entity_type: key.entity_type,
                entity_ids: members.into_iter().map(|m| m.id).collect(),
            }
        })
        .collect();
    duplicates.sort_by(|a, b| (&a.name, &a.entity_type).cmp(&(&b.name, &b.entity_type)));
    duplicates
}

/// Fire-and-forget handle for requesting a background consolidation pass.
/// Requests made while one is already queued are coalesced.
#[derive(Clone, Default)]
pub struct ConsolidationTrigger {
    tx: Option<mpsc::Sender<()>>,
}

impl ConsolidationTrigger {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn request(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                warn!("consolidation loop is gone; skipping request");
            }
        }
    }
}

pub fn spawn_consolidation_loop(
    consolidator: Arc<Consolidator>,
    shutdown: CancellationToken,
) -> (ConsolidationTrigger, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<()>(1);
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                request = rx.recv() => {
                    if request.is_none() {
                        break;
                    }
                    match consolidator.consolidate_identical_entities().await {
                        Ok(summary) if summary.groups_merged > 0 => {
                            info!(
                                groups = summary.groups_merged,
                                removed = summary.entities_removed,
                                "background consolidation merged duplicates"
                            );
                        }
                        Ok(_) => debug!("background consolidation found no duplicates"),
                        Err(err) => warn!(error = %err, "background consolidation failed"),
                    }
                }
            }
        }
        debug!("consolidation loop stopped");
    });
    (ConsolidationTrigger { tx: Some(tx) }, handle)
}
