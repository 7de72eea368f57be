pub mod consolidation;
pub mod memory;
pub mod model;
pub mod review;
pub mod store;
pub mod writer;

pub use consolidation::{
    ConsolidationSummary, ConsolidationTrigger, Consolidator, DuplicateGroup,
    spawn_consolidation_loop,
};
pub use memory::{MemoryGraphStore, MemoryGraphStoreConfig};
pub use model::{
    BatchOutcome, DocumentGraph, DocumentNode, EntityKey, EntityNode, GraphStatement,
    RelationType, RelationshipEdge, ReviewStatus, WriteBatch,
};
pub use review::{RelationshipEdit, ReviewService};
pub use store::GraphStore;
pub use writer::{DocumentMeta, GraphWriter, WriteSummary};
