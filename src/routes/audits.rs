use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::db::{aggregates, operations};
use crate::models::{
    AppState, AuditRecord, LocationWiseAudits, ObservationRecord, SbuWiseAudits, YearFilter,
    YearFilterQuery, YearWiseAudits, YearWiseSbu,
};
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ai-audit-progress", get(audit_progress))
        .route("/observations", get(observations))
        .route("/location-wise-audits", get(location_wise_audits))
        .route("/sbu-wise-audits", get(sbu_wise_audits))
        .route("/year-wise-audits", get(year_wise_audits))
        .route("/year-wise-sbu", get(year_wise_sbu))
        .with_state(state)
}

async fn audit_progress(State(state): State<AppState>) -> AppResult<Json<Vec<AuditRecord>>> {
    Ok(Json(operations::get_audit_records(&state.pool).await?))
}

async fn observations(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ObservationRecord>>> {
    Ok(Json(operations::get_observation_records(&state.pool).await?))
}

async fn location_wise_audits(
    State(state): State<AppState>,
    Query(query): Query<YearFilterQuery>,
) -> AppResult<Json<Vec<LocationWiseAudits>>> {
    let filter = YearFilter::from(query);
    let records = operations::get_audit_records(&state.pool).await?;
    Ok(Json(aggregates::location_wise(&records, filter)))
}

async fn sbu_wise_audits(
    State(state): State<AppState>,
    Query(query): Query<YearFilterQuery>,
) -> AppResult<Json<Vec<SbuWiseAudits>>> {
    let filter = YearFilter::from(query);
    let records = operations::get_audit_records(&state.pool).await?;
    Ok(Json(aggregates::sbu_wise(&records, filter)))
}

async fn year_wise_audits(State(state): State<AppState>) -> AppResult<Json<Vec<YearWiseAudits>>> {
    let records = operations::get_audit_records(&state.pool).await?;
    Ok(Json(aggregates::year_wise(&records)))
}

async fn year_wise_sbu(State(state): State<AppState>) -> AppResult<Json<Vec<YearWiseSbu>>> {
    let records = operations::get_audit_records(&state.pool).await?;
    Ok(Json(aggregates::year_wise_sbu(&records)))
}
