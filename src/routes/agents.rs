use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use crate::db::operations;
use crate::models::{AgentChatRequest, AgentChatResponse, AppState, ReportRunRequest};
use crate::report::{GeneratedReport, ReportFile};
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/agents/chat", post(chat))
        .route("/agents/self-rag", post(self_rag_chat))
        .route("/agents/report", post(run_report))
        .route("/agents/summary-report", post(summary_report))
        .route("/agents/reports", get(list_reports))
        .route("/agents/summary/sbu-wise", get(sbu_wise_summary))
        .route("/agents/summary/location-wise", get(location_wise_summary))
        .with_state(state)
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<AgentChatRequest>,
) -> AppResult<Json<AgentChatResponse>> {
    info!(question_len = request.question.len(), "Chat request received");
    let thread_id = request.thread_id.as_deref().unwrap_or("default");
    let answer = state.rag.ask(&request.question, thread_id).await?;
    Ok(Json(AgentChatResponse { answer }))
}

async fn self_rag_chat(
    State(state): State<AppState>,
    Json(request): Json<AgentChatRequest>,
) -> AppResult<Json<AgentChatResponse>> {
    info!(question_len = request.question.len(), "Self-RAG request received");
    let thread_id = request.thread_id.as_deref().unwrap_or("default");
    let answer = state.self_rag.ask(&request.question, thread_id).await?;
    Ok(Json(AgentChatResponse { answer }))
}

async fn run_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRunRequest>,
) -> AppResult<Json<AgentChatResponse>> {
    let thread_id = request.thread_id.as_deref().unwrap_or("default");
    let answer = state
        .supervisor
        .run(request.question.as_deref(), thread_id)
        .await?;
    Ok(Json(AgentChatResponse { answer }))
}

/// One-shot synthesis: a single large-context analysis call over the audit
/// statistics, straight to PDF — no orchestration graph involved.
async fn summary_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRunRequest>,
) -> AppResult<Json<GeneratedReport>> {
    let audits = operations::get_audit_records(&state.pool).await?;
    let data = serde_json::to_string(&audits)
        .map_err(|e| crate::types::AppError::Internal(format!("Failed to serialize audit data: {}", e)))?;
    let content = match request.question.as_deref() {
        Some(task) => format!("{}\n\nUser request: {}", data, task),
        None => data,
    };
    let report = state.report_pipeline.generate_summary_report(&content).await?;
    Ok(Json(report))
}

async fn list_reports(State(state): State<AppState>) -> AppResult<Json<Vec<ReportFile>>> {
    let reports = state.reports.list_reports().await?;
    Ok(Json(reports))
}

async fn sbu_wise_summary(State(state): State<AppState>) -> AppResult<Json<AgentChatResponse>> {
    let answer = state.summary.generate_sbu_wise_summary().await?;
    Ok(Json(AgentChatResponse { answer }))
}

async fn location_wise_summary(
    State(state): State<AppState>,
) -> AppResult<Json<AgentChatResponse>> {
    let answer = state.summary.generate_location_wise_summary().await?;
    Ok(Json(AgentChatResponse { answer }))
}
