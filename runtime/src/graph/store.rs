use async_trait::async_trait;

use crate::storage::StorageResult;

use super::model::{
    BatchOutcome, DocumentGraph, EntityMergeOutcome, EntityNode, RelationshipEdge, ReviewChange,
    WriteBatch,
};

/// Transactional property-graph client.
///
/// Every mutating call is atomic: it either applies completely or leaves the
/// graph untouched. Merge policy lives on the model types so all backends
/// agree on it.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn initialize(&self) -> StorageResult<()>;
    async fn finalize(&self) -> StorageResult<()>;

    /// Applies all statements in one transaction.
    async fn apply(&self, batch: WriteBatch) -> StorageResult<BatchOutcome>;

    async fn entities(&self) -> StorageResult<Vec<EntityNode>>;
    async fn entities_by_ids(&self, ids: &[String]) -> StorageResult<Vec<Option<EntityNode>>>;

    async fn relationship(&self, id: &str) -> StorageResult<Option<RelationshipEdge>>;
    async fn relationships(&self) -> StorageResult<Vec<RelationshipEdge>>;

    /// Applies a review change to one edge. `None` when the edge is missing.
    async fn review_relationship(
        &self,
        id: &str,
        change: ReviewChange,
    ) -> StorageResult<Option<RelationshipEdge>>;

    /// Folds `absorbed` into `survivor`, re-pointing their edges and document
    /// links; colliding edges are combined.
    async fn merge_entities(
        &self,
        survivor: &str,
        absorbed: &[String],
    ) -> StorageResult<EntityMergeOutcome>;

    async fn document_graph(&self, document_id: &str) -> StorageResult<Option<DocumentGraph>>;

    /// Inserts nodes and edges verbatim, bypassing merge keys. Used for
    /// imports of legacy data.
    async fn import_raw(
        &self,
        entities: Vec<EntityNode>,
        relationships: Vec<RelationshipEdge>,
    ) -> StorageResult<()>;
}
