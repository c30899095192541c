use std::sync::Arc;

use sqlx::PgPool;

use crate::agents::rag::RagAgent;
use crate::agents::self_rag::SelfRagAgent;
use crate::agents::summary::SummaryService;
use crate::agents::supervisor::Supervisor;
use crate::config::Config;
use crate::report::{ReportPipeline, ReportStore};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub rag: Arc<RagAgent>,
    pub self_rag: Arc<SelfRagAgent>,
    pub supervisor: Arc<Supervisor>,
    pub summary: Arc<SummaryService>,
    pub reports: Arc<ReportStore>,
    pub report_pipeline: Arc<ReportPipeline>,
}

// Audit tables
// Note: FromRow is needed for runtime query_as (without DATABASE_URL at compile time)

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct AuditRecord {
    pub id: i32,
    pub area_name: String,
    pub sbu: String,
    pub location: String,
    pub status: String,
    pub days: Option<i32>,
    pub per_comp: f64,
    pub overdue_days: i32,
    pub trouble: i32,
    pub needs_attention: i32,
    pub reviewer: String,
    pub lead_auditor: Option<String>,
    pub audit_from: chrono::NaiveDate,
    pub audit_to: chrono::NaiveDate,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct ObservationRecord {
    pub id: i32,
    pub observation_title: String,
    pub short_observation: String,
    pub audit_area: String,
    pub risk: String,
    pub status: String,
    pub financial_implications: f64,
    pub target_completion_date: chrono::NaiveDate,
    pub auditee: String,
    pub lead_auditor: String,
    pub category: String,
    pub observation_type: String,
    pub repeat_observation: bool,
    pub action_plan_status: String,
    pub age: i32,
    pub financial_year: String,
    pub location: String,
    pub region: String,
    pub sbu: String,
    pub department: String,
}

/// Inclusive year range; an absent bound leaves that side unbounded.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct YearFilter {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

impl YearFilter {
    pub fn contains(&self, year: i32) -> bool {
        self.start_year.map(|start| year >= start).unwrap_or(true)
            && self.end_year.map(|end| year <= end).unwrap_or(true)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start_year.is_none() && self.end_year.is_none()
    }
}

// Pre-aggregated views

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LocationWiseAudits {
    pub location: String,
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SbuWiseAudits {
    pub sbu: String,
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct YearWiseAudits {
    pub year: i32,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct YearWiseSbu {
    pub year: i32,
    pub sbu: String,
    pub total: usize,
}

// API Request/Response types

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentChatRequest {
    pub question: String,
    pub thread_id: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct AgentChatResponse {
    pub answer: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRunRequest {
    pub question: Option<String>,
    pub thread_id: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearFilterQuery {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

impl From<YearFilterQuery> for YearFilter {
    fn from(query: YearFilterQuery) -> Self {
        YearFilter {
            start_year: query.start_year,
            end_year: query.end_year,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
}

#[cfg(test)]
pub mod test_fixtures {
    use super::*;
    use chrono::NaiveDate;

    pub fn audit(location: &str, sbu: &str, year: i32, status: &str) -> AuditRecord {
        AuditRecord {
            id: 0,
            area_name: "Procurement".to_string(),
            sbu: sbu.to_string(),
            location: location.to_string(),
            status: status.to_string(),
            days: Some(10),
            per_comp: 50.0,
            overdue_days: 0,
            trouble: 0,
            needs_attention: 0,
            reviewer: "Reviewer".to_string(),
            lead_auditor: None,
            audit_from: NaiveDate::from_ymd_opt(year, 3, 1).unwrap(),
            audit_to: NaiveDate::from_ymd_opt(year, 3, 20).unwrap(),
        }
    }

    pub fn observation(status: &str, year: i32, month: u32, day: u32) -> ObservationRecord {
        ObservationRecord {
            id: 0,
            observation_title: "Vendor onboarding gaps".to_string(),
            short_observation: "Missing approvals".to_string(),
            audit_area: "Procurement".to_string(),
            risk: "High".to_string(),
            status: status.to_string(),
            financial_implications: 0.0,
            target_completion_date: NaiveDate::from_ymd_opt(year, month, day).unwrap(),
            auditee: "Auditee".to_string(),
            lead_auditor: "Lead".to_string(),
            category: "Process".to_string(),
            observation_type: "Control".to_string(),
            repeat_observation: false,
            action_plan_status: "Pending".to_string(),
            age: 30,
            financial_year: format!("{}-{}", year, year + 1),
            location: "Mumbai".to_string(),
            region: "West".to_string(),
            sbu: "Retail".to_string(),
            department: "Finance".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_filter_inclusive_bounds() {
        let filter = YearFilter {
            start_year: Some(2022),
            end_year: Some(2023),
        };
        assert!(!filter.contains(2021));
        assert!(filter.contains(2022));
        assert!(filter.contains(2023));
        assert!(!filter.contains(2024));
    }

    #[test]
    fn test_year_filter_absent_bounds_are_unbounded() {
        let filter = YearFilter::default();
        assert!(filter.is_unbounded());
        assert!(filter.contains(1900));
        assert!(filter.contains(3000));

        let only_start = YearFilter {
            start_year: Some(2020),
            end_year: None,
        };
        assert!(!only_start.contains(2019));
        assert!(only_start.contains(2999));
    }
}
