//! Vector store build job
//!
//! Fetches the audit and observation rows, turns each table into a textual
//! corpus (deterministic overview plus LLM enrichment), chunks, embeds, and
//! persists one index directory per domain. Runs as a batch job; the server
//! only ever reads the result.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::db::operations;
use crate::embeddings::document_processor::{self, CHUNK_OVERLAP, CHUNK_SIZE};
use crate::embeddings::vector_index::{Document, VectorIndex};
use crate::embeddings::{Embedder, OpenAiEmbeddings};
use crate::llm::provider::create_chat_model;
use crate::types::AppResult;

const EMBED_BATCH_SIZE: usize = 64;

pub const AUDIT_DOMAIN: &str = "audit_data";
pub const OBSERVATION_DOMAIN: &str = "observation_data";

pub async fn run(config: &Config, pool: &PgPool) -> AppResult<()> {
    let llm = create_chat_model(&config.llm)?;
    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbeddings::new(
        &config.llm.openai_api_key,
        &config.llm.embedding_model,
    ));
    let store_path = Path::new(&config.storage.vector_store_path);
    let today = Utc::now().date_naive();

    info!("Building audit data index");
    let audits = operations::get_audit_records(pool).await?;
    let overview = document_processor::audit_overview(&audits, today);
    let enriched = document_processor::enrich_for_index(llm.as_ref(), &overview).await?;
    build_domain_index(
        embedder.as_ref(),
        &enriched,
        AUDIT_DOMAIN,
        &store_path.join(AUDIT_DOMAIN),
    )
    .await?;

    info!("Building observation data index");
    let observations = operations::get_observation_records(pool).await?;
    let overview = document_processor::observation_overview(&observations, today);
    let enriched = document_processor::enrich_for_index(llm.as_ref(), &overview).await?;
    build_domain_index(
        embedder.as_ref(),
        &enriched,
        OBSERVATION_DOMAIN,
        &store_path.join(OBSERVATION_DOMAIN),
    )
    .await?;

    info!("Ingestion complete");
    Ok(())
}

async fn build_domain_index(
    embedder: &dyn Embedder,
    text: &str,
    source: &str,
    dir: &Path,
) -> AppResult<()> {
    let chunks = document_processor::split_text(text, CHUNK_SIZE, CHUNK_OVERLAP);
    info!(domain = source, chunks = chunks.len(), "Embedding chunks");

    let mut index = VectorIndex::new();
    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let vectors = embedder.embed(batch).await?;
        for (chunk, vector) in batch.iter().zip(vectors) {
            index.add(vector, Document::new(chunk.clone(), source));
        }
    }

    index.save(dir)
}
