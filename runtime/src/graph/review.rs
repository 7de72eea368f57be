use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::error::{IngestError, IngestResult};

use super::{
    model::{RelationshipEdge, ReviewChange, ReviewStatus},
    store::GraphStore,
};

/// Fields a reviewer may correct on an edge.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationshipEdit {
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub original_text: Option<String>,
    #[serde(default)]
    pub significance: Option<u8>,
    #[serde(default)]
    pub page_number: Option<u32>,
}

/// Human curation of merged edges. Only status and review fields change;
/// edges are never created, deleted or returned to `unverified` here.
pub struct ReviewService {
    store: Arc<dyn GraphStore>,
    admins: HashSet<String>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn GraphStore>, admins: HashSet<String>) -> Self {
        Self { store, admins }
    }

    pub async fn confirm(&self, relationship_id: &str, reviewer: &str) -> IngestResult<RelationshipEdge> {
        let change = self.change(ReviewStatus::Verified, reviewer)?;
        self.apply(relationship_id, change).await
    }

    pub async fn flag(
        &self,
        relationship_id: &str,
        reviewer: &str,
        reason: &str,
    ) -> IngestResult<RelationshipEdge> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(IngestError::InvalidRequest(
                "a reason is required to flag a relationship".into(),
            ));
        }
        let mut change = self.change(ReviewStatus::Incorrect, reviewer)?;
        change.flag_reason = Some(reason.to_string());
        self.apply(relationship_id, change).await
    }

    pub async fn edit(
        &self,
        relationship_id: &str,
        reviewer: &str,
        edit: RelationshipEdit,
    ) -> IngestResult<RelationshipEdge> {
        if let Some(confidence) = edit.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(IngestError::Validation(format!(
                    "confidence {confidence} outside [0, 1]"
                )));
            }
        }
        if let Some(significance) = edit.significance {
            if !(1..=5).contains(&significance) {
                return Err(IngestError::Validation(format!(
                    "significance {significance} outside 1..=5"
                )));
            }
        }

        let mut change = self.change(ReviewStatus::Verified, reviewer)?;
        change.confidence = edit.confidence;
        change.original_text = edit
            .original_text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        change.significance = edit.significance;
        change.page_number = edit.page_number.filter(|page| *page > 0);
        self.apply(relationship_id, change).await
    }

    /// Non-empty admin list restricts destructive graph maintenance.
    pub fn ensure_admin(&self, actor: &str) -> IngestResult<()> {
        let actor = ensure_identity(actor)?;
        if self.admins.is_empty() || self.admins.contains(actor) {
            Ok(())
        } else {
            Err(IngestError::PermissionDenied(format!(
                "{actor} may not run consolidation"
            )))
        }
    }

    fn change(&self, status: ReviewStatus, reviewer: &str) -> IngestResult<ReviewChange> {
        let reviewer = ensure_identity(reviewer)?;
        Ok(ReviewChange {
            status,
            reviewer: reviewer.to_string(),
            at: Utc::now(),
            flag_reason: None,
            confidence: None,
            original_text: None,
            significance: None,
            page_number: None,
        })
    }

    async fn apply(&self, relationship_id: &str, change: ReviewChange) -> IngestResult<RelationshipEdge> {
        let status = change.status;
        let reviewer = change.reviewer.clone();
        let edge = self
            .store
            .review_relationship(relationship_id, change)
            .await
            .map_err(|err| IngestError::store(&err))?
            .ok_or_else(|| IngestError::not_found("relationship", relationship_id))?;
        info!(
            relationship_id = %relationship_id,
            status = status.as_str(),
            reviewer = %reviewer,
            "relationship reviewed"
        );
        Ok(edge)
    }
}

fn ensure_identity(reviewer: &str) -> IngestResult<&str> {
    let reviewer = reviewer.trim();
    if reviewer.is_empty() {
        Err(IngestError::PermissionDenied(
            "review actions require an authenticated reviewer".into(),
        ))
    } else {
        Ok(reviewer)
    }
}
