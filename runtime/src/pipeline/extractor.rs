use std::{fmt::Write as _, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    ai::{ExtractedTriplets, ResponsesClient, triplets_schema},
    triplets::Triplet,
};

const SYSTEM_PROMPT: &str = "You extract knowledge graph triplets from scientific and technical documents. \
Each triplet states one factual relationship found in the text as subject, predicate and object. \
Only report relationships the text supports; never add outside knowledge. \
Write predicates in snake_case and prefix them with `does_not_` when the text negates the relationship. \
Quote the supporting sentence in `original_text`.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub text: String,
    pub max_triplets: usize,
    pub context: Option<String>,
    /// Per-page text when the source format carries page boundaries.
    pub pages: Vec<PageText>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    pub triplets: Vec<Triplet>,
    pub model: String,
    pub tokens_used: Option<u64>,
}

/// Language-understanding collaborator that turns document text into
/// candidate triplets.
#[async_trait]
pub trait TripletExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionOutput>;
}

pub struct LlmTripletExtractor {
    client: Arc<ResponsesClient>,
    model: String,
}

impl LlmTripletExtractor {
    pub fn new(client: Arc<ResponsesClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TripletExtractor for LlmTripletExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionOutput> {
        let prompt = build_user_prompt(request);
        debug!(
            model = %self.model,
            chars = request.text.len(),
            pages = request.pages.len(),
            "requesting triplet extraction"
        );

        let response = self
            .client
            .responses_structured::<ExtractedTriplets>(
                &self.model,
                SYSTEM_PROMPT,
                &prompt,
                "knowledge_triplets",
                triplets_schema(request.max_triplets),
                true,
            )
            .await?;

        let mut triplets = response.output.triplets;
        triplets.truncate(request.max_triplets);

        Ok(ExtractionOutput {
            triplets,
            model: response.model,
            tokens_used: response.total_tokens,
        })
    }
}

pub fn build_user_prompt(request: &ExtractionRequest) -> String {
    let mut prompt = format!(
        "Extract at most {} triplets from the document below.\n",
        request.max_triplets
    );
    if let Some(context) = request.context.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(prompt, "Focus: {}", context.trim());
    }

    if request.pages.is_empty() {
        let _ = write!(prompt, "\n---\n{}\n---", request.text);
        return prompt;
    }

    prompt.push_str("Set `page_number` from the page markers.\n");
    for page in &request.pages {
        let _ = write!(prompt, "\n[page {}]\n{}\n", page.page_number, page.text);
    }
    prompt
}
