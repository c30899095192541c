//! Comparison summaries
//!
//! One-call analyses over the pre-aggregated views: no graph, no retrieval —
//! fetch, serialize, ask, return.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::db::{aggregates, operations};
use crate::llm::{ChatMessage, ChatModel, ChatOptions};
use crate::prompts;
use crate::types::{AppError, AppResult};

pub struct SummaryService {
    llm: Arc<dyn ChatModel>,
    pool: PgPool,
}

impl SummaryService {
    pub fn new(llm: Arc<dyn ChatModel>, pool: PgPool) -> Self {
        Self { llm, pool }
    }

    pub async fn generate_sbu_wise_summary(&self) -> AppResult<String> {
        info!("Generating SBU-wise summary");
        let records = operations::get_audit_records(&self.pool).await?;
        let data = aggregates::year_wise_sbu(&records);
        let json = serde_json::to_string_pretty(&data)
            .map_err(|e| AppError::Internal(format!("Failed to serialize SBU data: {}", e)))?;
        self.summarize(&prompts::sbu_wise_comparison_prompt(&json)).await
    }

    pub async fn generate_location_wise_summary(&self) -> AppResult<String> {
        info!("Generating location-wise summary");
        let records = operations::get_audit_records(&self.pool).await?;
        let data = aggregates::year_wise(&records);
        let json = serde_json::to_string_pretty(&data)
            .map_err(|e| AppError::Internal(format!("Failed to serialize year data: {}", e)))?;
        self.summarize(&prompts::location_wise_comparison_prompt(&json)).await
    }

    async fn summarize(&self, prompt: &str) -> AppResult<String> {
        let options = ChatOptions {
            system: Some(prompts::DATA_ANALYST_SYSTEM.to_string()),
            max_tokens: 4000,
            ..ChatOptions::default()
        };
        let outcome = self
            .llm
            .chat(&[ChatMessage::human(prompt)], &options)
            .await?;

        let text = outcome.message.content().to_string();
        info!(summary_len = text.len(), "Summary generated");
        Ok(text)
    }
}
