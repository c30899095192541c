// PDF rendering via headless Chromium
//
// The renderer is an external collaborator behind a trait so the report
// pipeline and its tests never depend on a browser being installed.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use futures::StreamExt;
use tracing::info;

use crate::types::{AppError, AppResult};

/// Print configuration: page margins in inches plus optional header/footer
/// templates (Chromium's print-header HTML dialect).
#[derive(Debug, Clone)]
pub struct PdfOptions {
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            margin_top: 0.8,
            margin_bottom: 0.4,
            margin_left: 0.4,
            margin_right: 0.4,
            header_template: None,
            footer_template: None,
        }
    }
}

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, html: &str, options: &PdfOptions) -> AppResult<Vec<u8>>;
}

pub struct ChromiumRenderer;

// A4 paper, inches
const PAPER_WIDTH: f64 = 8.27;
const PAPER_HEIGHT: f64 = 11.69;

#[async_trait]
impl PdfRenderer for ChromiumRenderer {
    async fn render(&self, html: &str, options: &PdfOptions) -> AppResult<Vec<u8>> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .build()
            .map_err(|e| AppError::Render(format!("Browser config error: {}", e)))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::Render(format!("Failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = async {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| AppError::Render(format!("Failed to open page: {}", e)))?;

            page.set_content(html)
                .await
                .map_err(|e| AppError::Render(format!("Failed to set page content: {}", e)))?;

            let params = PrintToPdfParams {
                print_background: Some(true),
                display_header_footer: Some(
                    options.header_template.is_some() || options.footer_template.is_some(),
                ),
                header_template: options.header_template.clone(),
                footer_template: options.footer_template.clone(),
                paper_width: Some(PAPER_WIDTH),
                paper_height: Some(PAPER_HEIGHT),
                margin_top: Some(options.margin_top),
                margin_bottom: Some(options.margin_bottom),
                margin_left: Some(options.margin_left),
                margin_right: Some(options.margin_right),
                ..Default::default()
            };

            page.pdf(params)
                .await
                .map_err(|e| AppError::Render(format!("Failed to print PDF: {}", e)))
        }
        .await;

        let _ = browser.close().await;
        handler_task.abort();

        if let Ok(bytes) = &result {
            info!(bytes = bytes.len(), "PDF rendered");
        }
        result
    }
}
