pub mod responses;
pub mod schemas;

pub use responses::{ResponsesClient, StructuredResponse};
pub use schemas::{ENTITY_TYPE_VARIANTS, ExtractedTriplets, triplets_schema};
