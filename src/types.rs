// Shared type definitions and the application error taxonomy

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::graph::GraphError;

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Graph execution error: {0}")]
    Graph(#[from] GraphError),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, serde::Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    /// Stable machine-readable code for the response body. Recursion and
    /// loop limits get their own codes so callers can retry with a fresh
    /// thread instead of treating the failure as permanent.
    fn code(&self) -> &'static str {
        match self {
            AppError::Graph(GraphError::RecursionLimit { .. }) => "recursion_limit_exceeded",
            AppError::Graph(GraphError::LoopLimit { .. }) => "loop_limit_exceeded",
            AppError::Graph(_) => "graph_error",
            AppError::Database(_) => "fetch_failed",
            AppError::LlmApi(_) => "llm_error",
            AppError::Embedding(_) => "embedding_error",
            AppError::Render(_) => "render_error",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Graph(GraphError::RecursionLimit { .. })
            | AppError::Graph(GraphError::LoopLimit { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-facing message. Structured detail goes to the log at the point
    /// of failure; the caller only sees an opaque summary.
    fn public_message(&self) -> String {
        match self {
            AppError::NotFound(what) => format!("Not found: {}", what),
            AppError::InvalidRequest(why) => why.clone(),
            AppError::Graph(GraphError::RecursionLimit { .. }) => {
                "The agent exceeded its step budget. Retry with a fresh thread.".to_string()
            }
            AppError::Graph(GraphError::LoopLimit { loop_name, .. }) => format!(
                "The agent exhausted its retry budget for '{}'. Retry with a fresh thread.",
                loop_name
            ),
            AppError::Database(_) => "Failed to fetch data".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, code = self.code(), "Request failed");
        let body = ErrorBody {
            error: self.code(),
            message: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recursion_limit_has_distinct_code() {
        let err = AppError::Graph(GraphError::RecursionLimit {
            limit: 25,
            node: "generate".to_string(),
        });
        assert_eq!(err.code(), "recursion_limit_exceeded");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_loop_limit_names_the_loop() {
        let err = AppError::Graph(GraphError::LoopLimit {
            loop_name: "transform_query".to_string(),
            limit: 3,
        });
        assert_eq!(err.code(), "loop_limit_exceeded");
        assert!(err.public_message().contains("transform_query"));
    }

    #[test]
    fn test_database_error_is_opaque() {
        let err = AppError::Database(sqlx::Error::PoolClosed);
        assert_eq!(err.public_message(), "Failed to fetch data");
    }
}
