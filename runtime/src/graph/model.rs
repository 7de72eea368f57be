use std::fmt;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::triplets::{Polarity, normalize_predicate};

/// Edge label derived from a normalized predicate. Only `[A-Z0-9_]` ever
/// reaches a store, so backends that interpolate it into query text are safe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelationType(String);

impl RelationType {
    pub fn from_predicate(predicate: &str) -> Self {
        Self(normalize_predicate(predicate).to_ascii_uppercase())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty()
            || !raw
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            bail!("invalid relationship type {raw:?}");
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase predicate form, e.g. `TARGETS` -> `targets`.
    pub fn predicate(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RelationType {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RelationType> for String {
    fn from(value: RelationType) -> Self {
        value.0
    }
}

/// Unique merge key of an entity node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub name: String,
    pub entity_type: String,
}

impl EntityKey {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Unverified,
    Verified,
    Incorrect,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Unverified => "unverified",
            ReviewStatus::Verified => "verified",
            ReviewStatus::Incorrect => "incorrect",
        }
    }

    pub fn is_reviewed(&self) -> bool {
        !matches!(self, ReviewStatus::Unverified)
    }
}

/// Sets `slot` only when it is still absent.
pub fn fill_if_unset<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if slot.is_none() {
        *slot = incoming;
    }
}

/// Keeps the larger of the stored and incoming value; absent never lowers.
pub fn raise_to_max<T: PartialOrd + Copy>(slot: &mut Option<T>, incoming: Option<T>) {
    match (*slot, incoming) {
        (Some(current), Some(next)) if next > current => *slot = Some(next),
        (None, Some(next)) => *slot = Some(next),
        _ => {}
    }
}

/// Appends each source not already present, keeping first-seen order.
pub fn union_sources(sources: &mut Vec<String>, incoming: impl IntoIterator<Item = String>) {
    for source in incoming {
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    #[serde(default)]
    pub significance: Option<u8>,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl EntityNode {
    pub fn create(upsert: &EntityUpsert, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_id("ent"),
            name: upsert.key.name.clone(),
            entity_type: upsert.key.entity_type.clone(),
            significance: upsert.significance,
            created_by: upsert.created_by.clone(),
            created_at: now,
            sources: vec![upsert.document_id.clone()],
            embedding: None,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.name.clone(), self.entity_type.clone())
    }

    /// Merge of a repeated observation onto the stored node.
    pub fn absorb(&mut self, upsert: &EntityUpsert) {
        raise_to_max(&mut self.significance, upsert.significance);
        fill_if_unset(&mut self.created_by, upsert.created_by.clone());
        union_sources(&mut self.sources, [upsert.document_id.clone()]);
    }

    /// Folds a duplicate node into this one. Name and type of `self` survive.
    pub fn combine(&mut self, other: EntityNode) {
        raise_to_max(&mut self.significance, other.significance);
        if other.created_at < self.created_at {
            self.created_at = other.created_at;
            if other.created_by.is_some() {
                self.created_by = other.created_by;
            }
        } else {
            fill_if_unset(&mut self.created_by, other.created_by);
        }
        union_sources(&mut self.sources, other.sources);
        fill_if_unset(&mut self.embedding, other.embedding);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentNode {
    pub fn create(upsert: &DocumentUpsert, now: DateTime<Utc>) -> Self {
        Self {
            id: upsert.id.clone(),
            title: upsert.title.clone(),
            created_by: upsert.created_by.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn absorb(&mut self, upsert: &DocumentUpsert, now: DateTime<Utc>) {
        fill_if_unset(&mut self.title, upsert.title.clone());
        fill_if_unset(&mut self.created_by, upsert.created_by.clone());
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub id: String,
    pub subject_id: String,
    pub object_id: String,
    pub relation_type: RelationType,
    pub sources: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub original_text: Option<String>,
    pub polarity: Polarity,
    #[serde(default)]
    pub status: ReviewStatus,
    #[serde(default)]
    pub significance: Option<u8>,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub extracted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub flag_reason: Option<String>,
}

impl RelationshipEdge {
    pub fn create(
        upsert: &RelationshipUpsert,
        subject_id: String,
        object_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id("rel"),
            subject_id,
            object_id,
            polarity: Polarity::from_predicate(&upsert.relation_type.predicate()),
            relation_type: upsert.relation_type.clone(),
            sources: vec![upsert.document_id.clone()],
            confidence: upsert.confidence,
            original_text: upsert.original_text.clone(),
            status: ReviewStatus::Unverified,
            significance: upsert.significance,
            page_number: upsert.page_number,
            extracted_by: upsert.extracted_by.clone(),
            created_at: now,
            reviewed_by: None,
            reviewed_at: None,
            flag_reason: None,
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            subject_id: self.subject_id.clone(),
            relation_type: self.relation_type.clone(),
            object_id: self.object_id.clone(),
        }
    }

    /// Merge of a repeated observation. Evidence fields are first-writer-wins,
    /// significance is max-wins, review state is never touched.
    pub fn absorb(&mut self, upsert: &RelationshipUpsert) {
        union_sources(&mut self.sources, [upsert.document_id.clone()]);
        fill_if_unset(&mut self.confidence, upsert.confidence);
        fill_if_unset(&mut self.original_text, upsert.original_text.clone());
        fill_if_unset(&mut self.page_number, upsert.page_number);
        fill_if_unset(&mut self.extracted_by, upsert.extracted_by.clone());
        raise_to_max(&mut self.significance, upsert.significance);
    }

    /// Folds a colliding edge (same endpoints and type after an entity merge)
    /// into this one.
    pub fn combine(&mut self, other: RelationshipEdge) {
        union_sources(&mut self.sources, other.sources);
        raise_to_max(&mut self.confidence, other.confidence);
        raise_to_max(&mut self.significance, other.significance);
        fill_if_unset(&mut self.original_text, other.original_text);
        fill_if_unset(&mut self.page_number, other.page_number);
        fill_if_unset(&mut self.extracted_by, other.extracted_by);
        if other.created_at < self.created_at {
            self.created_at = other.created_at;
        }
        if !self.status.is_reviewed() && other.status.is_reviewed() {
            self.status = other.status;
            self.reviewed_by = other.reviewed_by;
            self.reviewed_at = other.reviewed_at;
            self.flag_reason = other.flag_reason;
        }
    }

    pub fn apply_review(&mut self, change: &ReviewChange) {
        self.status = change.status;
        self.reviewed_by = Some(change.reviewer.clone());
        self.reviewed_at = Some(change.at);
        if let Some(reason) = &change.flag_reason {
            self.flag_reason = Some(reason.clone());
        }
        if let Some(confidence) = change.confidence {
            self.confidence = Some(confidence);
        }
        if let Some(text) = &change.original_text {
            self.original_text = Some(text.clone());
        }
        if let Some(significance) = change.significance {
            self.significance = Some(significance);
        }
        if let Some(page) = change.page_number {
            self.page_number = Some(page);
        }
    }
}

/// Uniqueness key of an edge: one edge per type between an ordered pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub subject_id: String,
    pub relation_type: RelationType,
    pub object_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpsert {
    pub key: EntityKey,
    pub significance: Option<u8>,
    pub created_by: Option<String>,
    pub document_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpsert {
    pub id: String,
    pub title: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipUpsert {
    pub subject: EntityKey,
    pub object: EntityKey,
    pub relation_type: RelationType,
    pub document_id: String,
    pub confidence: Option<f64>,
    pub original_text: Option<String>,
    pub significance: Option<u8>,
    pub page_number: Option<u32>,
    pub extracted_by: Option<String>,
}

/// One parameterized upsert. A `WriteBatch` of these commits atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphStatement {
    MergeEntity(EntityUpsert),
    MergeDocument(DocumentUpsert),
    LinkExtractedFrom {
        entity: EntityKey,
        document_id: String,
    },
    MergeRelationship(RelationshipUpsert),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    pub statements: Vec<GraphStatement>,
}

impl WriteBatch {
    pub fn push(&mut self, statement: GraphStatement) {
        self.statements.push(statement);
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub entities_created: usize,
    pub entities_merged: usize,
    pub documents_created: usize,
    pub relationships_created: usize,
    pub relationships_merged: usize,
}

/// Status/field change applied to one edge under the store's write lock.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewChange {
    pub status: ReviewStatus,
    pub reviewer: String,
    pub at: DateTime<Utc>,
    pub flag_reason: Option<String>,
    pub confidence: Option<f64>,
    pub original_text: Option<String>,
    pub significance: Option<u8>,
    pub page_number: Option<u32>,
}

/// Entities and edges that cite one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentGraph {
    pub document: DocumentNode,
    pub entities: Vec<EntityNode>,
    pub relationships: Vec<RelationshipEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMergeOutcome {
    pub survivor_id: String,
    pub entities_removed: usize,
    pub relationships_repointed: usize,
    pub relationships_combined: usize,
}

fn generate_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn upsert(document_id: &str) -> RelationshipUpsert {
        RelationshipUpsert {
            subject: EntityKey::new("Vemurafenib", "Drug"),
            object: EntityKey::new("BRAF V600E", "Gene"),
            relation_type: RelationType::from_predicate("targets"),
            document_id: document_id.to_string(),
            confidence: Some(0.8),
            original_text: Some("Vemurafenib targets BRAF V600E".into()),
            significance: Some(3),
            page_number: Some(2),
            extracted_by: Some("gpt".into()),
        }
    }

    #[test]
    fn relation_type_is_identifier_safe() {
        assert_eq!(RelationType::from_predicate("is part-of").as_str(), "IS_PART_OF");
        assert_eq!(RelationType::from_predicate("").as_str(), "RELATED_TO");
        assert!(RelationType::parse("TARGETS").is_ok());
        assert!(RelationType::parse("TARGETS]->(x) DETACH DELETE x //").is_err());
        assert!(serde_json::from_str::<RelationType>("\"bad type\"").is_err());
    }

    #[test]
    fn fill_and_raise_helpers() {
        let mut slot = None;
        fill_if_unset(&mut slot, Some(1));
        fill_if_unset(&mut slot, Some(2));
        assert_eq!(slot, Some(1));

        let mut significance = Some(3u8);
        raise_to_max(&mut significance, Some(2));
        assert_eq!(significance, Some(3));
        raise_to_max(&mut significance, None);
        assert_eq!(significance, Some(3));
        raise_to_max(&mut significance, Some(5));
        assert_eq!(significance, Some(5));
    }

    #[test]
    fn relationship_absorb_is_additive_and_idempotent() {
        let now = Utc::now();
        let mut edge = RelationshipEdge::create(&upsert("doc-a"), "s".into(), "o".into(), now);
        assert_eq!(edge.polarity, Polarity::Positive);
        assert_eq!(edge.status, ReviewStatus::Unverified);

        let mut second = upsert("doc-b");
        second.confidence = Some(0.1);
        second.significance = Some(5);
        edge.absorb(&second);
        edge.absorb(&second);

        assert_eq!(edge.sources, vec!["doc-a".to_string(), "doc-b".to_string()]);
        assert_eq!(edge.confidence, Some(0.8));
        assert_eq!(edge.significance, Some(5));
    }

    #[test]
    fn absorb_never_touches_review_state() {
        let mut edge = RelationshipEdge::create(&upsert("doc-a"), "s".into(), "o".into(), Utc::now());
        edge.status = ReviewStatus::Incorrect;
        edge.absorb(&upsert("doc-b"));
        assert_eq!(edge.status, ReviewStatus::Incorrect);
    }

    #[test]
    fn negative_predicates_produce_negative_edges() {
        let mut negative = upsert("doc-a");
        negative.relation_type = RelationType::from_predicate("does_not_inhibit");
        let edge = RelationshipEdge::create(&negative, "s".into(), "o".into(), Utc::now());
        assert_eq!(edge.polarity, Polarity::Negative);
    }

    #[test]
    fn entity_combine_keeps_earliest_and_max() {
        let now = Utc::now();
        let base = EntityUpsert {
            key: EntityKey::new("BRAF", "Gene"),
            significance: Some(2),
            created_by: Some("alice".into()),
            document_id: "doc-a".into(),
        };
        let mut survivor = EntityNode::create(&base, now);
        let mut older = EntityNode::create(
            &EntityUpsert {
                significance: Some(4),
                created_by: Some("bob".into()),
                document_id: "doc-b".into(),
                ..base.clone()
            },
            now - Duration::hours(1),
        );
        older.embedding = Some(vec![0.1, 0.2]);

        survivor.combine(older);
        assert_eq!(survivor.significance, Some(4));
        assert_eq!(survivor.created_at, now - Duration::hours(1));
        assert_eq!(survivor.created_by.as_deref(), Some("bob"));
        assert_eq!(survivor.sources, vec!["doc-a".to_string(), "doc-b".to_string()]);
        assert!(survivor.embedding.is_some());
    }

    #[test]
    fn document_title_first_write_wins() {
        let now = Utc::now();
        let mut doc = DocumentNode::create(
            &DocumentUpsert {
                id: "doc-a".into(),
                title: None,
                created_by: None,
            },
            now,
        );
        let titled = DocumentUpsert {
            id: "doc-a".into(),
            title: Some("First".into()),
            created_by: Some("alice".into()),
        };
        doc.absorb(&titled, now);
        doc.absorb(
            &DocumentUpsert {
                title: Some("Second".into()),
                ..titled
            },
            now + Duration::seconds(5),
        );
        assert_eq!(doc.title.as_deref(), Some("First"));
        assert_eq!(doc.updated_at, now + Duration::seconds(5));
    }
}
