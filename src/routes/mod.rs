//! API Routes
//!
//! - `/agents/*` - conversational agents, report generation, summaries
//! - `/ai-audit-progress`, `/observations` - raw table views
//! - `/location-wise-audits`, `/sbu-wise-audits`, `/year-wise-audits`,
//!   `/year-wise-sbu` - aggregate views
//! - `/health` - liveness and database check
//! - `/files/*` - generated report artifacts

pub mod agents;
pub mod audits;
pub mod files;
pub mod health;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors::cors_layer;
use crate::models::AppState;

pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let cors = cors_layer(&state.config.server.cors_allowed_origins);
    let reports_dir = state.config.storage.reports_path.clone();

    Router::new()
        .merge(agents::router(state.clone()))
        .merge(audits::router(state.clone()))
        .merge(health::router(state))
        .merge(files::router(&reports_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
