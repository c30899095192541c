// Audit Insight - RAG and multi-agent orchestration over a relational audit database

pub mod agents;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod graph;
pub mod ingest;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod prompts;
pub mod report;
pub mod routes;
pub mod tools;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
