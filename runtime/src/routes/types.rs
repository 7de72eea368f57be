use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    graph::{
        ConsolidationSummary, DocumentGraph, DocumentNode, DuplicateGroup, EntityNode,
        RelationshipEdit, RelationshipEdge,
    },
    jobs::IngestJob,
    pipeline::IngestOutcome,
    triplets::{Triplet, TripletError},
};

#[derive(Debug, Clone, Deserialize)]
pub struct IngestTextRequest {
    pub text: String,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub max_triplets: Option<usize>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewerRequest {
    pub reviewer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagRequest {
    pub reviewer: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditRequest {
    pub reviewer: String,
    #[serde(flatten)]
    pub edit: RelationshipEdit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsolidationRunRequest {
    pub actor: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeEntitiesRequest {
    pub actor: String,
    pub entity_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobListQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Rejected candidate exactly as the extractor produced it.
#[derive(Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct TripletPayload {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub subject_types: Vec<String>,
    pub object_types: Vec<String>,
    pub confidence_score: Option<f64>,
    pub original_text: Option<String>,
    pub extracted_by: Option<String>,
    pub relationship_significance: Option<u8>,
    pub subject_significance: Option<u8>,
    pub object_significance: Option<u8>,
    pub page_number: Option<u32>,
}

impl From<&Triplet> for TripletPayload {
    fn from(triplet: &Triplet) -> Self {
        Self {
            subject: triplet.subject.clone(),
            predicate: triplet.predicate.clone(),
            object: triplet.object.clone(),
            subject_types: triplet.subject_types.clone(),
            object_types: triplet.object_types.clone(),
            confidence_score: triplet.confidence_score,
            original_text: triplet.original_text.clone(),
            extracted_by: triplet.extracted_by.clone(),
            relationship_significance: triplet.relationship_significance,
            subject_significance: triplet.subject_significance,
            object_significance: triplet.object_significance,
            page_number: triplet.page_number,
        }
    }
}

#[derive(Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct ValidationErrorResponse {
    pub index: usize,
    pub reason: String,
    pub triplet: TripletPayload,
}

impl From<&TripletError> for ValidationErrorResponse {
    fn from(err: &TripletError) -> Self {
        Self {
            index: err.index,
            reason: err.reason.clone(),
            triplet: TripletPayload::from(&err.triplet),
        }
    }
}

#[derive(Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct IngestResponse {
    pub document_id: String,
    pub triplets_extracted: usize,
    pub triplets_written: usize,
    pub validation_errors: Vec<ValidationErrorResponse>,
    pub model: String,
    pub tokens_used: Option<u64>,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            validation_errors: outcome
                .validation_errors
                .iter()
                .map(ValidationErrorResponse::from)
                .collect(),
            document_id: outcome.document_id,
            triplets_extracted: outcome.triplets_extracted,
            triplets_written: outcome.triplets_written,
            model: outcome.model,
            tokens_used: outcome.tokens_used,
        }
    }
}

#[derive(Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct JobResponse {
    pub job_id: String,
    pub status: String,
    pub source: String,
    pub document_id: Option<String>,
    pub document_title: Option<String>,
    pub filename: Option<String>,
    pub user_id: Option<String>,
    pub max_triplets: usize,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
    pub triplets_extracted: Option<usize>,
    pub triplets_written: Option<usize>,
}

impl From<IngestJob> for JobResponse {
    fn from(job: IngestJob) -> Self {
        Self {
            status: job.status.as_str().to_string(),
            source: job.source.as_str().to_string(),
            created_at: job.created_at.to_rfc3339(),
            started_at: job.started_at.map(|at| at.to_rfc3339()),
            completed_at: job.completed_at.map(|at| at.to_rfc3339()),
            job_id: job.job_id,
            document_id: job.document_id,
            document_title: job.document_title,
            filename: job.filename,
            user_id: job.user_id,
            max_triplets: job.max_triplets,
            error_message: job.error_message,
            triplets_extracted: job.triplets_extracted,
            triplets_written: job.triplets_written,
        }
    }
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct JobListResponse {
    pub total: usize,
    pub jobs: Vec<JobResponse>,
}

#[derive(Default, Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct EntityResponse {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    pub significance: Option<u8>,
    pub sources: Vec<String>,
    pub created_at: String,
}

impl From<EntityNode> for EntityResponse {
    fn from(node: EntityNode) -> Self {
        Self {
            created_at: node.created_at.to_rfc3339(),
            id: node.id,
            name: node.name,
            entity_type: node.entity_type,
            significance: node.significance,
            sources: node.sources,
        }
    }
}

#[derive(Default, Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct RelationshipResponse {
    pub id: String,
    pub subject_id: String,
    pub object_id: String,
    pub relation_type: String,
    pub polarity: String,
    pub status: String,
    pub confidence: Option<f64>,
    pub original_text: Option<String>,
    pub significance: Option<u8>,
    pub page_number: Option<u32>,
    pub extracted_by: Option<String>,
    pub sources: Vec<String>,
    pub created_at: String,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub flag_reason: Option<String>,
}

impl From<RelationshipEdge> for RelationshipResponse {
    fn from(edge: RelationshipEdge) -> Self {
        Self {
            relation_type: edge.relation_type.as_str().to_string(),
            polarity: edge.polarity.as_str().to_string(),
            status: edge.status.as_str().to_string(),
            created_at: edge.created_at.to_rfc3339(),
            reviewed_at: edge.reviewed_at.map(|at| at.to_rfc3339()),
            id: edge.id,
            subject_id: edge.subject_id,
            object_id: edge.object_id,
            confidence: edge.confidence,
            original_text: edge.original_text,
            significance: edge.significance,
            page_number: edge.page_number,
            extracted_by: edge.extracted_by,
            sources: edge.sources,
            reviewed_by: edge.reviewed_by,
            flag_reason: edge.flag_reason,
        }
    }
}

#[derive(Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct DocumentResponse {
    pub id: String,
    pub title: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<DocumentNode> for DocumentResponse {
    fn from(node: DocumentNode) -> Self {
        Self {
            created_at: node.created_at.to_rfc3339(),
            updated_at: node.updated_at.to_rfc3339(),
            id: node.id,
            title: node.title,
            created_by: node.created_by,
        }
    }
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct DocumentGraphResponse {
    pub document: DocumentResponse,
    pub entities: Vec<EntityResponse>,
    pub relationships: Vec<RelationshipResponse>,
}

impl From<DocumentGraph> for DocumentGraphResponse {
    fn from(graph: DocumentGraph) -> Self {
        Self {
            document: graph.document.into(),
            entities: graph.entities.into_iter().map(Into::into).collect(),
            relationships: graph.relationships.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct DuplicateGroupResponse {
    pub name: String,
    pub entity_type: String,
    pub entity_ids: Vec<String>,
}

impl From<DuplicateGroup> for DuplicateGroupResponse {
    fn from(group: DuplicateGroup) -> Self {
        Self {
            name: group.name,
            entity_type: group.entity_type,
            entity_ids: group.entity_ids,
        }
    }
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct DuplicateListResponse {
    pub total: usize,
    pub groups: Vec<DuplicateGroupResponse>,
}

#[derive(Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct ConsolidationResponse {
    pub groups_merged: usize,
    pub entities_removed: usize,
    pub relationships_repointed: usize,
    pub relationships_combined: usize,
}

impl From<ConsolidationSummary> for ConsolidationResponse {
    fn from(summary: ConsolidationSummary) -> Self {
        Self {
            groups_merged: summary.groups_merged,
            entities_removed: summary.entities_removed,
            relationships_repointed: summary.relationships_repointed,
            relationships_combined: summary.relationships_combined,
        }
    }
}
