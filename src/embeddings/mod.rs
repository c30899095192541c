//! Embeddings layer
//!
//! The `Embedder` trait hides the embedding model behind an opaque
//! vector-producing oracle; the OpenAI adapter is the production
//! implementation. Vector indices are built once by the `ingest` batch job
//! and are read-only while serving queries.

pub mod document_processor;
pub mod vector_index;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::types::{AppError, AppResult};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, preserving input order.
    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;
}

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAiEmbeddings {
    client: Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

#[derive(Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", OPENAI_API_BASE);
        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Embedding(format!("Embeddings request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(parsed) = serde_json::from_str::<OpenAiErrorResponse>(&error_text) {
                return Err(AppError::Embedding(format!(
                    "Embeddings API error ({}): {}",
                    status, parsed.error.message
                )));
            }
            return Err(AppError::Embedding(format!(
                "Embeddings API error ({}): {}",
                status, error_text
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| AppError::Embedding(format!("Failed to parse embeddings response: {}", e)))?;

        let mut entries = parsed.data;
        entries.sort_by_key(|e| e.index);

        if entries.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "Embeddings API returned {} vectors for {} inputs",
                entries.len(),
                texts.len()
            )));
        }

        Ok(entries.into_iter().map(|e| e.embedding).collect())
    }
}
