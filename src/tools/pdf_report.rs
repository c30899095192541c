// PDF generation exposed as a worker tool

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::report::ReportStore;
use crate::tools::Tool;
use crate::types::{AppError, AppResult};

pub const PDF_TOOL_NAME: &str = "generate_pdf_report";

pub struct PdfReportTool {
    store: Arc<ReportStore>,
}

impl PdfReportTool {
    pub fn new(store: Arc<ReportStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for PdfReportTool {
    fn name(&self) -> &str {
        PDF_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Generate a PDF document from markdown content"
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The markdown content to convert to PDF"
                },
                "title": {
                    "type": "string",
                    "description": "The title of the PDF document"
                }
            },
            "required": ["content", "title"]
        })
    }

    async fn invoke(&self, args: serde_json::Value) -> AppResult<String> {
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::InvalidRequest("pdf tool requires a 'content' string".to_string()))?;
        let title = args
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("Audit Summary Report");

        let saved = self.store.save_report(content, title).await?;
        Ok(format!(
            "PDF generated successfully, file URL: {}",
            saved.url
        ))
    }
}
