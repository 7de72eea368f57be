use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::{
    error::{IngestError, IngestResult},
    graph::{ConsolidationTrigger, DocumentMeta, GraphWriter},
    triplets::{TripletError, deduplicate_triplets, validate_and_sanitize_triplets},
};

use super::{
    decoder::{DocumentDecoder, DocumentPayload},
    extractor::{ExtractionRequest, TripletExtractor},
    utils::summarize_content,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub payload: DocumentPayload,
    /// Caller-chosen id; otherwise derived from the content hash.
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub max_triplets: usize,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub document_id: String,
    pub triplets_extracted: usize,
    pub triplets_written: usize,
    pub validation_errors: Vec<TripletError>,
    pub model: String,
    pub tokens_used: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub extraction_timeout: Duration,
    pub max_triplets: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extraction_timeout: Duration::from_secs(600),
            max_triplets: 50,
        }
    }
}

/// decode -> extract -> sanitize/validate -> deduplicate -> write.
pub struct IngestService {
    decoder: Arc<dyn DocumentDecoder>,
    extractor: Arc<dyn TripletExtractor>,
    writer: GraphWriter,
    consolidation: ConsolidationTrigger,
    config: IngestConfig,
}

impl IngestService {
    pub fn new(
        decoder: Arc<dyn DocumentDecoder>,
        extractor: Arc<dyn TripletExtractor>,
        writer: GraphWriter,
        consolidation: ConsolidationTrigger,
        config: IngestConfig,
    ) -> Self {
        Self {
            decoder,
            extractor,
            writer,
            consolidation,
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Requested limit, falling back to the configured default when unset.
    pub fn effective_max_triplets(&self, requested: usize) -> usize {
        if requested == 0 {
            self.config.max_triplets
        } else {
            requested
        }
    }

    #[instrument(skip_all, fields(user_id = request.user_id.as_deref().unwrap_or("-")))]
    pub async fn ingest(&self, request: IngestRequest) -> IngestResult<IngestOutcome> {
        let IngestRequest {
            payload,
            document_id,
            title,
            user_id,
            max_triplets,
            context,
        } = request;
        let max_triplets = self.effective_max_triplets(max_triplets);

        let decoder = Arc::clone(&self.decoder);
        let decoded = tokio::task::spawn_blocking(move || decoder.decode(&payload))
            .await
            .map_err(|err| IngestError::Extraction(format!("document decoding aborted: {err}")))?
            .map_err(|err| IngestError::extraction(&err))?;

        let document_id = document_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or(decoded.content_id);
        info!(
            doc_id = %document_id,
            preview = %summarize_content(&decoded.text, 80),
            "extracting triplets"
        );

        let extraction = ExtractionRequest {
            text: decoded.text,
            max_triplets,
            context,
            pages: decoded.pages,
        };
        let output = timeout(
            self.config.extraction_timeout,
            self.extractor.extract(&extraction),
        )
        .await
        .map_err(|_| {
            IngestError::Extraction(format!(
                "timed out after {}s",
                self.config.extraction_timeout.as_secs()
            ))
        })?
        .map_err(|err| IngestError::extraction(&err))?;

        let model = output.model;
        let triplets_extracted = output.triplets.len();
        let attributed: Vec<_> = output
            .triplets
            .into_iter()
            .map(|mut triplet| {
                if triplet.extracted_by.is_none() && !model.is_empty() {
                    triplet.extracted_by = Some(model.clone());
                }
                triplet
            })
            .collect();

        let (valid, validation_errors) = validate_and_sanitize_triplets(&attributed);
        if !validation_errors.is_empty() {
            warn!(
                doc_id = %document_id,
                rejected = validation_errors.len(),
                "dropped invalid triplets"
            );
        }
        let unique = deduplicate_triplets(valid);

        let meta = DocumentMeta {
            id: document_id,
            title,
        };
        let summary = self
            .writer
            .write_triplets(&unique, &meta, user_id.as_deref())
            .await?;

        self.consolidation.request();

        info!(
            doc_id = %summary.document_id,
            extracted = triplets_extracted,
            written = summary.triplets_written,
            "document ingested"
        );

        Ok(IngestOutcome {
            document_id: summary.document_id,
            triplets_extracted,
            triplets_written: summary.triplets_written,
            validation_errors,
            model,
            tokens_used: output.tokens_used,
        })
    }
}
