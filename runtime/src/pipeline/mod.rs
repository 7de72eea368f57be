pub mod decoder;
pub mod extractor;
pub mod ingest;
pub mod utils;

pub use decoder::{DecodedDocument, DefaultDocumentDecoder, DocumentDecoder, DocumentPayload};
pub use extractor::{
    ExtractionOutput, ExtractionRequest, LlmTripletExtractor, PageText, TripletExtractor,
};
pub use ingest::{IngestConfig, IngestOutcome, IngestRequest, IngestService};
pub use utils::compute_mdhash_id;
