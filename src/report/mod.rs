//! Report synthesis pipeline
//!
//! Pre-aggregated audit statistics go through one large-context LLM call to
//! produce a long-form markdown report, the markdown is rendered to HTML and
//! printed to PDF, and the artifact lands in the reports directory together
//! with an explicit metadata entry. Creation times come from the metadata
//! sidecar, never from parsing the filename.

pub mod renderer;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulldown_cmark::{html, Options, Parser};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::llm::{ChatMessage, ChatModel, ChatOptions};
use crate::prompts;
use crate::report::renderer::{PdfOptions, PdfRenderer};
use crate::types::{AppError, AppResult};
use crate::utils::slugify;

const METADATA_FILE: &str = "reports.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFile {
    pub filename: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReportMeta {
    filename: String,
    title: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedReport {
    pub markdown: String,
    pub pdf_url: String,
}

pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

/// Drop the model's scratchpad analysis block and unwrap the summary tags,
/// leaving clean markdown.
pub fn strip_scratchpad_tags(markdown: &str) -> String {
    let mut text = markdown.to_string();

    while let (Some(start), Some(end)) = (
        text.find("<report_breakdown>"),
        text.find("</report_breakdown>"),
    ) {
        if end < start {
            break;
        }
        text.replace_range(start..end + "</report_breakdown>".len(), "");
    }

    text = text.replace("<summary>", "").replace("</summary>", "");
    text.trim().to_string()
}

fn page_template(body_html: &str, title: &str) -> String {
    format!(
        r#"<html>
  <head>
    <title>{title}</title>
    <style>
      body {{ font-family: Arial, sans-serif; margin: 40px; line-height: 1.6; }}
      h1 {{ color: #333; border-bottom: 1px solid #ddd; padding-bottom: 10px; }}
      h2 {{ color: #444; margin-top: 20px; font-size: 1.5em; }}
      h3 {{ color: #555; margin-top: 16px; font-size: 1.2em; }}
      p {{ margin-bottom: 16px; }}
      ul, ol {{ margin-bottom: 16px; padding-left: 20px; }}
      li {{ margin-bottom: 8px; }}
      pre {{ background-color: #f5f5f5; padding: 10px; border-radius: 5px; overflow-x: auto; }}
      code {{ font-family: monospace; }}
      table {{ border-collapse: collapse; width: 100%; margin-bottom: 16px; }}
      th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}
      th {{ background-color: #f2f2f2; }}
    </style>
  </head>
  <body>
    <div class="content">{body}</div>
  </body>
</html>"#,
        title = title,
        body = body_html,
    )
}

fn default_pdf_options(title: &str) -> PdfOptions {
    PdfOptions {
        header_template: Some(format!(
            r#"<div style="width: 100%; font-size: 10px; padding: 0 20px; color: #555; border-bottom: 1px solid #eee;">{}</div>"#,
            title
        )),
        footer_template: Some(
            r#"<div style="width: 100%; font-size: 9px; text-align: center; color: #777;">Page <span class="pageNumber"></span> of <span class="totalPages"></span></div>"#
                .to_string(),
        ),
        ..PdfOptions::default()
    }
}

/// Filesystem store for generated report artifacts with an explicit metadata
/// sidecar. Writes are serialized behind a mutex; the sidecar is the source
/// of truth for creation times.
pub struct ReportStore {
    dir: PathBuf,
    app_url: String,
    renderer: Arc<dyn PdfRenderer>,
    write_lock: Mutex<()>,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>, app_url: &str, renderer: Arc<dyn PdfRenderer>) -> AppResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| AppError::Internal(format!("Failed to create reports dir: {}", e)))?;
        Ok(Self {
            dir,
            app_url: app_url.trim_end_matches('/').to_string(),
            renderer,
            write_lock: Mutex::new(()),
        })
    }

    pub fn file_url(&self, filename: &str) -> String {
        format!("{}/files/{}", self.app_url, filename)
    }

    /// Render markdown to a PDF artifact and record its metadata. Returns the
    /// public URL of the stored file.
    pub async fn save_report(&self, markdown: &str, title: &str) -> AppResult<ReportFile> {
        let created_at = Utc::now();
        let filename = format!("{}_{}.pdf", slugify(title), created_at.timestamp_millis());

        let body = markdown_to_html(markdown);
        let html = page_template(&body, title);
        let pdf = self
            .renderer
            .render(&html, &default_pdf_options(title))
            .await?;

        let _guard = self.write_lock.lock().await;

        let path = self.dir.join(&filename);
        std::fs::write(&path, &pdf)
            .map_err(|e| AppError::Internal(format!("Failed to write report: {}", e)))?;

        let mut metadata = self.load_metadata();
        metadata.push(ReportMeta {
            filename: filename.clone(),
            title: title.to_string(),
            created_at,
        });
        self.store_metadata(&metadata)?;

        info!(filename = %filename, "Report saved");

        Ok(ReportFile {
            url: self.file_url(&filename),
            filename,
            created_at,
        })
    }

    pub async fn list_reports(&self) -> AppResult<Vec<ReportFile>> {
        let _guard = self.write_lock.lock().await;
        let metadata = self.load_metadata();

        let mut reports: Vec<ReportFile> = metadata
            .iter()
            .map(|meta| ReportFile {
                filename: meta.filename.clone(),
                url: self.file_url(&meta.filename),
                created_at: meta.created_at,
            })
            .collect();

        // Files that predate the metadata sidecar fall back to their
        // filesystem modification time.
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| AppError::Internal(format!("Failed to read reports dir: {}", e)))?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".pdf") || metadata.iter().any(|m| m.filename == name) {
                continue;
            }
            let created_at = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            reports.push(ReportFile {
                url: self.file_url(&name),
                filename: name,
                created_at,
            });
        }

        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    fn load_metadata(&self) -> Vec<ReportMeta> {
        let path = self.dir.join(METADATA_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(error = %e, "Corrupt report metadata, starting fresh");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    fn store_metadata(&self, metadata: &[ReportMeta]) -> AppResult<()> {
        let path = self.dir.join(METADATA_FILE);
        let bytes = serde_json::to_vec_pretty(metadata)
            .map_err(|e| AppError::Internal(format!("Failed to serialize report metadata: {}", e)))?;
        std::fs::write(&path, bytes)
            .map_err(|e| AppError::Internal(format!("Failed to write report metadata: {}", e)))
    }
}

/// The one-shot synthesis path: one large-context LLM call over prepared
/// statistics, then straight to PDF. Not graph-based.
pub struct ReportPipeline {
    llm: Arc<dyn ChatModel>,
    store: Arc<ReportStore>,
}

impl ReportPipeline {
    pub fn new(llm: Arc<dyn ChatModel>, store: Arc<ReportStore>) -> Self {
        Self { llm, store }
    }

    pub async fn generate_summary_report(&self, content: &str) -> AppResult<GeneratedReport> {
        info!(content_len = content.len(), "Generating summary report");

        let options = ChatOptions {
            system: Some(prompts::DATA_ANALYST_SYSTEM.to_string()),
            max_tokens: 16000,
            ..ChatOptions::default()
        };
        let messages = vec![ChatMessage::human(prompts::report_analysis_prompt(content))];

        let outcome = self.llm.chat(&messages, &options).await?;
        let markdown = strip_scratchpad_tags(outcome.message.content());
        if markdown.is_empty() {
            return Err(AppError::LlmApi(
                "Model returned no content for the summary report".to_string(),
            ));
        }

        let saved = self
            .store
            .save_report(&markdown, "Audit Summary Report")
            .await?;

        Ok(GeneratedReport {
            markdown,
            pdf_url: saved.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullRenderer;

    #[async_trait]
    impl PdfRenderer for NullRenderer {
        async fn render(&self, _html: &str, _options: &PdfOptions) -> AppResult<Vec<u8>> {
            Ok(b"%PDF-1.4 stub".to_vec())
        }
    }

    #[test]
    fn test_markdown_to_html_renders_tables() {
        let md = "| a | b |\n|---|---|\n| 1 | 2 |";
        let html = markdown_to_html(md);
        assert!(html.contains("<table>"));
    }

    #[test]
    fn test_strip_scratchpad_removes_breakdown_keeps_summary() {
        let md = "<report_breakdown>internal notes</report_breakdown>\n<summary>\n# Report\nBody\n</summary>";
        let cleaned = strip_scratchpad_tags(md);
        assert!(!cleaned.contains("internal notes"));
        assert!(!cleaned.contains("<summary>"));
        assert!(cleaned.contains("# Report"));
    }

    #[test]
    fn test_strip_scratchpad_passes_plain_markdown_through() {
        let md = "# Clean Report\n\nNothing to strip.";
        assert_eq!(strip_scratchpad_tags(md), md);
    }

    #[tokio::test]
    async fn test_save_and_list_reports_uses_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            ReportStore::new(dir.path(), "http://localhost:3000", Arc::new(NullRenderer)).unwrap();

        let saved = store.save_report("# Body", "Audit Summary Report").await.unwrap();
        assert!(saved.filename.starts_with("audit_summary_report_"));
        assert!(saved.url.contains("/files/"));

        let listed = store.list_reports().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].filename, saved.filename);
        assert_eq!(listed[0].created_at, saved.created_at);
    }

    #[tokio::test]
    async fn test_list_reports_picks_up_untracked_files() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            ReportStore::new(dir.path(), "http://localhost:3000", Arc::new(NullRenderer)).unwrap();

        std::fs::write(dir.path().join("legacy_report.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not a report").unwrap();

        let listed = store.list_reports().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].filename, "legacy_report.pdf");
    }
}
