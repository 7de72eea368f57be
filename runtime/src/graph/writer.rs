use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    error::{IngestError, IngestResult},
    triplets::Triplet,
};

use super::{
    model::{
        DocumentUpsert, EntityKey, EntityUpsert, GraphStatement, RelationType, RelationshipUpsert,
        WriteBatch,
    },
    store::GraphStore,
};

#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub id: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub document_id: String,
    pub triplets_written: usize,
    pub entities_created: usize,
    pub relationships_created: usize,
    pub relationships_merged: usize,
}

/// Idempotent upsert of extracted triplets. All triplets of one document go
/// into a single batch, so a document is either fully visible or not at all.
#[derive(Clone)]
pub struct GraphWriter {
    store: Arc<dyn GraphStore>,
    transaction_timeout: Duration,
}

impl GraphWriter {
    pub fn new(store: Arc<dyn GraphStore>, transaction_timeout: Duration) -> Self {
        Self {
            store,
            transaction_timeout,
        }
    }

    pub async fn write_triplets(
        &self,
        triplets: &[Triplet],
        document: &DocumentMeta,
        user: Option<&str>,
    ) -> IngestResult<WriteSummary> {
        let batch = build_batch(triplets, document, user);
        debug!(doc_id = %document.id, statements = batch.len(), "writing triplet batch");

        // The commit runs on its own task: hitting the timeout stops the
        // wait, never a half-finished persist.
        let store = self.store.clone();
        let commit = tokio::spawn(async move { store.apply(batch).await });
        let outcome = match tokio::time::timeout(self.transaction_timeout, commit).await {
            Ok(Ok(result)) => result.map_err(|err| IngestError::store(&err))?,
            Ok(Err(join_err)) => {
                return Err(IngestError::StoreTransaction(format!(
                    "transaction task for {} aborted: {join_err}",
                    document.id
                )));
            }
            Err(_) => {
                warn!(doc_id = %document.id, timeout = ?self.transaction_timeout, "graph transaction still running after timeout");
                return Err(IngestError::StoreTransaction(format!(
                    "transaction for {} exceeded {:?}",
                    document.id, self.transaction_timeout
                )));
            }
        };

        let summary = WriteSummary {
            document_id: document.id.clone(),
            triplets_written: triplets.len(),
            entities_created: outcome.entities_created,
            relationships_created: outcome.relationships_created,
            relationships_merged: outcome.relationships_merged,
        };
        info!(
            doc_id = %document.id,
            triplets = summary.triplets_written,
            created = summary.relationships_created,
            merged = summary.relationships_merged,
            "triplets merged into graph"
        );
        Ok(summary)
    }
}

fn build_batch(triplets: &[Triplet], document: &DocumentMeta, user: Option<&str>) -> WriteBatch {
    let created_by = user.map(str::to_string);
    let mut batch = WriteBatch::default();

    batch.push(GraphStatement::MergeDocument(DocumentUpsert {
        id: document.id.clone(),
        title: document.title.clone(),
        created_by: created_by.clone(),
    }));

    for triplet in triplets {
        let subject = EntityKey::new(triplet.subject.clone(), triplet.subject_type());
        let object = EntityKey::new(triplet.object.clone(), triplet.object_type());

        for (key, significance) in [
            (&subject, triplet.subject_significance),
            (&object, triplet.object_significance),
        ] {
            batch.push(GraphStatement::MergeEntity(EntityUpsert {
                key: key.clone(),
                significance,
                created_by: created_by.clone(),
                document_id: document.id.clone(),
            }));
            batch.push(GraphStatement::LinkExtractedFrom {
                entity: key.clone(),
                document_id: document.id.clone(),
            });
        }

        batch.push(GraphStatement::MergeRelationship(RelationshipUpsert {
            subject,
            object,
            relation_type: RelationType::from_predicate(&triplet.predicate),
            document_id: document.id.clone(),
            confidence: triplet.confidence_score,
            original_text: triplet.original_text.clone(),
            significance: triplet.relationship_significance,
            page_number: triplet.page_number,
            extracted_by: triplet.extracted_by.clone(),
        }));
    }

    batch
}
