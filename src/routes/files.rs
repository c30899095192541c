use axum::Router;
use tower_http::services::ServeDir;

/// Serve generated report artifacts from the reports directory.
pub fn router(reports_dir: &str) -> Router {
    Router::new().nest_service("/files", ServeDir::new(reports_dir))
}
