//! Text preparation for the vector store build
//!
//! Raw audit/observation rows become a textual corpus in two steps: a
//! deterministic overview (headline counts, distribution tables, one line per
//! row) and an optional LLM enrichment pass that rewrites the overview into
//! retrieval-friendly insights. The result is chunked with a recursive
//! character splitter before embedding.

use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use tracing::warn;

use crate::llm::{ChatMessage, ChatModel, ChatOptions};
use crate::models::{AuditRecord, ObservationRecord};
use crate::types::AppResult;

pub const CHUNK_SIZE: usize = 500;
pub const CHUNK_OVERLAP: usize = 50;

/// Split text into chunks of at most `chunk_size` characters, preferring
/// paragraph, then line, then word boundaries, with `overlap` characters
/// carried between consecutive chunks.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let pieces = split_recursive(text, &["\n\n", "\n", " "], chunk_size);
    merge_pieces(&pieces, chunk_size, overlap)
}

fn split_recursive(text: &str, separators: &[&str], chunk_size: usize) -> Vec<String> {
    if text.chars().count() <= chunk_size {
        if text.is_empty() {
            return Vec::new();
        }
        return vec![text.to_string()];
    }

    let Some((sep, rest)) = separators.split_first() else {
        // No separator left: hard-split on character boundaries.
        let chars: Vec<char> = text.chars().collect();
        return chars
            .chunks(chunk_size)
            .map(|c| c.iter().collect())
            .collect();
    };

    let mut pieces = Vec::new();
    for part in text.split(sep) {
        if part.is_empty() {
            continue;
        }
        if part.chars().count() <= chunk_size {
            pieces.push(part.to_string());
        } else {
            pieces.extend(split_recursive(part, rest, chunk_size));
        }
    }
    pieces
}

fn merge_pieces(pieces: &[String], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        let candidate_len = if current.is_empty() {
            piece.chars().count()
        } else {
            current.chars().count() + 1 + piece.chars().count()
        };

        if candidate_len > chunk_size && !current.is_empty() {
            chunks.push(current.clone());
            // Carry the tail of the finished chunk into the next one, unless
            // the piece alone already fills the chunk.
            let tail: String = current
                .chars()
                .skip(current.chars().count().saturating_sub(overlap))
                .collect();
            current = tail;
            if current.chars().count() + 1 + piece.chars().count() > chunk_size {
                current.clear();
            }
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(piece);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn distribution<T, F>(items: &[T], key: F) -> HashMap<String, usize>
where
    F: Fn(&T) -> String,
{
    let mut counts = HashMap::new();
    for item in items {
        let k = key(item);
        let k = if k.is_empty() { "Unspecified".to_string() } else { k };
        *counts.entry(k).or_insert(0) += 1;
    }
    counts
}

fn format_distribution(label: &str, counts: &HashMap<String, usize>) -> String {
    let mut entries: Vec<(&String, &usize)> = counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let top: Vec<String> = entries
        .into_iter()
        .take(5)
        .map(|(k, v)| format!("{} ({})", k, v))
        .collect();
    format!("{}: {}.", label, top.join(", "))
}

/// Deterministic textual overview of the audit program, one section of
/// headline numbers followed by distribution tables and per-audit lines.
pub fn audit_overview(records: &[AuditRecord], as_of: NaiveDate) -> String {
    let total = records.len();
    let completed = records.iter().filter(|a| a.status.contains("Completed")).count();
    let in_progress = records.iter().filter(|a| a.status.contains("In progress")).count();
    let overdue = records.iter().filter(|a| a.overdue_days > 0).count();
    let total_overdue_days: i64 = records.iter().map(|a| a.overdue_days as i64).sum();
    let avg_overdue = if total > 0 { total_overdue_days as f64 / total as f64 } else { 0.0 };
    let total_trouble: i64 = records.iter().map(|a| a.trouble as i64).sum();
    let total_attention: i64 = records.iter().map(|a| a.needs_attention as i64).sum();
    let current_year_audits = records
        .iter()
        .filter(|a| a.audit_from.year() == as_of.year())
        .count();
    let avg_completion = if total > 0 {
        records.iter().map(|a| a.per_comp).sum::<f64>() / total as f64
    } else {
        0.0
    };

    let mut text = String::from("Audit Program Overview: \n");
    text.push_str(&format!("Total audits: {}. \n", total));
    text.push_str(&format!("Completed audits: {}. \n", completed));
    text.push_str(&format!("In-progress audits: {}. \n", in_progress));
    text.push_str(&format!(
        "Overdue audits: {} (Avg {:.1} days). \n",
        overdue, avg_overdue
    ));
    text.push_str(&format!(
        "Critical concerns: {} trouble cases, {} needing attention. \n",
        total_trouble, total_attention
    ));
    text.push_str(&format!("Current year audits: {}. \n", current_year_audits));
    text.push_str(&format!("Average completion: {:.1}%. \n", avg_completion));

    text.push_str(&format!(
        "{} \n",
        format_distribution("Status Distribution", &distribution(records, |a| a.status.clone()))
    ));
    text.push_str(&format!(
        "{} \n",
        format_distribution(
            "Business Unit Distribution",
            &distribution(records, |a| a.sbu.clone())
        )
    ));
    text.push_str(&format!(
        "{} \n",
        format_distribution(
            "Location Distribution",
            &distribution(records, |a| a.location.clone())
        )
    ));
    text.push_str(&format!(
        "{} \n",
        format_distribution(
            "Audit Area Distribution",
            &distribution(records, |a| a.area_name.clone())
        )
    ));
    text.push_str(&format!(
        "{} \n",
        format_distribution(
            "Reviewer Workload",
            &distribution(records, |a| a.reviewer.clone())
        )
    ));

    text.push_str(" Individual Audits: \n");
    for (i, audit) in records.iter().enumerate() {
        text.push_str(&format!(
            "Audit {}: Area: {}. SBU: {}. Location: {}. Status: {}. Completion: {}%. \
             Overdue: {} days. Trouble: {}. Needs Attention: {}. Reviewer: {}. \
             Lead Auditor: {}. Period: {} - {}. --- \n",
            i + 1,
            audit.area_name,
            audit.sbu,
            audit.location,
            audit.status,
            audit.per_comp,
            audit.overdue_days,
            audit.trouble,
            audit.needs_attention,
            audit.reviewer,
            audit.lead_auditor.as_deref().unwrap_or("Unassigned"),
            audit.audit_from,
            audit.audit_to,
        ));
    }
    text
}

/// Textual overview of observations, mirroring the audit one. Breach status
/// depends on the reference date: open observations past their target
/// completion date count as breached.
pub fn observation_overview(records: &[ObservationRecord], as_of: NaiveDate) -> String {
    let total = records.len();
    let closed = records.iter().filter(|o| o.status == "Close").count();
    let open = records.iter().filter(|o| o.status == "Open").count();
    let closed_ratio = if total > 0 {
        closed as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    let repeats = records.iter().filter(|o| o.repeat_observation).count();
    let avg_age = if total > 0 {
        records.iter().map(|o| o.age as f64).sum::<f64>() / total as f64
    } else {
        0.0
    };
    let current_year = records
        .iter()
        .filter(|o| o.financial_year.contains(&as_of.year().to_string()))
        .count();
    let with_financial_impact = records
        .iter()
        .filter(|o| o.financial_implications > 0.0)
        .count();

    let is_breached =
        |o: &&ObservationRecord| o.status == "Open" && o.target_completion_date < as_of;
    let breached: Vec<&ObservationRecord> = records.iter().filter(is_breached).collect();
    let not_due = total - breached.len();

    let mut text = String::from("Audit Observations Overview: \n");
    text.push_str(&format!(
        "Total observations: {} ({:.1}% closed). \n",
        total, closed_ratio
    ));
    text.push_str(&format!("Open observations: {}. \n", open));
    text.push_str(&format!("Repeat observations: {}. \n", repeats));
    text.push_str(&format!("Breached observations: {}. \n", breached.len()));
    text.push_str(&format!("Not due observations: {}. \n", not_due));
    text.push_str(&format!("Average age: {:.1} days. \n", avg_age));
    text.push_str(&format!("Current year observations: {}. \n", current_year));
    text.push_str(&format!(
        "Financial impacts recorded: {}. \n",
        with_financial_impact
    ));

    text.push_str(&format!(
        "{} \n",
        format_distribution("Risk Distribution", &distribution(records, |o| o.risk.clone()))
    ));
    let breached_owned: Vec<ObservationRecord> = breached.iter().map(|o| (*o).clone()).collect();
    text.push_str(&format!(
        "{} \n",
        format_distribution(
            "Location-wise Breached Observations",
            &distribution(&breached_owned, |o| o.location.clone())
        )
    ));
    text.push_str(&format!(
        "{} \n",
        format_distribution(
            "Risk-wise Breached Observations",
            &distribution(&breached_owned, |o| o.risk.clone())
        )
    ));
    text.push_str(&format!(
        "{} \n",
        format_distribution("Audit Areas", &distribution(records, |o| o.audit_area.clone()))
    ));
    text.push_str(&format!(
        "{} \n",
        format_distribution("SBU Distribution", &distribution(records, |o| o.sbu.clone()))
    ));
    text.push_str(&format!(
        "{} \n",
        format_distribution(
            "Observation Types",
            &distribution(records, |o| o.observation_type.clone())
        )
    ));
    text.push_str(&format!(
        "{} \n",
        format_distribution("Categories", &distribution(records, |o| o.category.clone()))
    ));
    text.push_str(&format!(
        "{} \n",
        format_distribution(
            "Action Plan Statuses",
            &distribution(records, |o| o.action_plan_status.clone())
        )
    ));

    text.push_str(" Individual Observations: \n");
    for (i, obs) in records.iter().enumerate() {
        text.push_str(&format!(
            "Observation {}: Title: {}. Audit Area: {}. Risk: {}. Status: {}. \
             Short Observation: {}. Financial Implications: {}. Target Completion Date: {}. \
             Auditee: {}. Lead Auditor: {}. Category: {}. Observation Type: {}. \
             Repeat Observation: {}. Action Plan Status: {}. Age: {} days. --- \n",
            i + 1,
            obs.observation_title,
            obs.audit_area,
            obs.risk,
            obs.status,
            obs.short_observation,
            obs.financial_implications,
            obs.target_completion_date,
            obs.auditee,
            obs.lead_auditor,
            obs.category,
            obs.observation_type,
            if obs.repeat_observation { "Yes" } else { "No" },
            obs.action_plan_status,
            obs.age,
        ));
    }
    text
}

/// Enrich a textual overview with LLM-written insights before chunking.
/// An LLM failure here degrades to the raw overview: the index build must
/// not fail because the enrichment pass did.
pub async fn enrich_for_index(llm: &dyn ChatModel, textual: &str) -> AppResult<String> {
    let options = ChatOptions {
        system: Some(
            "You are a helpful assistant that summarizes audit data and creates unique and \
             helpful insights from it. This text will be chunked and stored in a vector \
             database for retrieval."
                .to_string(),
        ),
        max_tokens: 8192,
        ..ChatOptions::default()
    };
    let messages = vec![ChatMessage::human(format!(
        "This is the preprocessed data:\n{}",
        textual
    ))];

    match llm.chat(&messages, &options).await {
        Ok(outcome) => Ok(outcome.message.content().to_string()),
        Err(e) => {
            warn!(error = %e, "LLM enrichment failed, indexing the raw overview");
            Ok(textual.to_string())
        }
    }
}
