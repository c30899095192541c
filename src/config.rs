use anyhow::Result;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub agents: AgentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub app_url: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub anthropic_api_key: String,
    pub openai_api_key: String,
    pub model: String,
    pub embedding_model: String,
}

/// Filesystem layout for persisted artifacts: one vector-index directory per
/// logical data domain, plus a flat directory for generated reports.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub vector_store_path: String,
    pub reports_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub checkpoint_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .expect("DATABASE_URL must be set"),
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                min_connections: env::var("DB_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
            },
            llm: LlmConfig {
                anthropic_api_key: env::var("ANTHROPIC_API_KEY")
                    .expect("ANTHROPIC_API_KEY must be set"),
                openai_api_key: env::var("OPENAI_API_KEY")
                    .expect("OPENAI_API_KEY must be set"),
                model: env::var("AI_MODEL")
                    .unwrap_or_else(|_| "claude-3-5-sonnet-20240620".to_string()),
                embedding_model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            },
            storage: StorageConfig {
                vector_store_path: env::var("VECTOR_STORE_PATH")
                    .unwrap_or_else(|_| "vector_store".to_string()),
                reports_path: env::var("REPORTS_PATH").unwrap_or_else(|_| "files".to_string()),
            },
            agents: AgentConfig {
                checkpoint_capacity: env::var("CHECKPOINT_CAPACITY")
                    .unwrap_or_else(|_| "1024".to_string())
                    .parse()?,
            },
        })
    }
}
