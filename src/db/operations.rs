use sqlx::PgPool;
use tracing::{error, info};

use crate::models::{AuditRecord, ObservationRecord};
use crate::types::{AppError, AppResult};

pub async fn get_audit_records(pool: &PgPool) -> AppResult<Vec<AuditRecord>> {
    let records = sqlx::query_as::<_, AuditRecord>(
        r#"
        SELECT id, area_name, sbu, location, status, days, per_comp,
               overdue_days, trouble, needs_attention, reviewer, lead_auditor,
               audit_from, audit_to
        FROM audit_progress
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| {
        error!(error = %e, table = "audit_progress", "Failed to fetch audit records");
        AppError::Database(e)
    })?;

    info!(count = records.len(), "Fetched audit records");
    Ok(records)
}

pub async fn get_observation_records(pool: &PgPool) -> AppResult<Vec<ObservationRecord>> {
    let records = sqlx::query_as::<_, ObservationRecord>(
        r#"
        SELECT id, observation_title, short_observation, audit_area, risk,
               status, financial_implications, target_completion_date, auditee,
               lead_auditor, category, observation_type, repeat_observation,
               action_plan_status, age, financial_year, location, region, sbu,
               department
        FROM observation_requests
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| {
        error!(error = %e, table = "observation_requests", "Failed to fetch observation records");
        AppError::Database(e)
    })?;

    info!(count = records.len(), "Fetched observation records");
    Ok(records)
}
