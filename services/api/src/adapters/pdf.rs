//! services/api/src/adapters/pdf.rs
//!
//! Converts report HTML into PDF by posting it to an HTML-to-PDF rendering
//! service (Gotenberg's Chromium route).

use async_trait::async_trait;
use diagnostic_core::ports::{PdfRenderingService, PortError, PortResult};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;

#[derive(Clone)]
pub struct HttpPdfAdapter {
    base_url: String,
    client: Client,
}

impl HttpPdfAdapter {
    pub fn new(base_url: String, timeout_secs: u64) -> PortResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/forms/chromium/convert/html", self.base_url)
    }
}

#[async_trait]
impl PdfRenderingService for HttpPdfAdapter {
    async fn render_pdf(&self, html: &str) -> PortResult<Vec<u8>> {
        let page = Part::text(html.to_string())
            .file_name("index.html")
            .mime_str("text/html")
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        // A4 with 20mm / 15mm margins, in inches.
        let form = Form::new()
            .part("files", page)
            .text("paperWidth", "8.27")
            .text("paperHeight", "11.7")
            .text("marginTop", "0.79")
            .text("marginBottom", "0.79")
            .text("marginLeft", "0.59")
            .text("marginRight", "0.59")
            .text("printBackground", "true");

        let resp = self
            .client
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| PortError::Upstream(format!("Failed to reach the PDF renderer: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "PDF rendering failed");
            return Err(PortError::Upstream(format!("PDF renderer returned {}", status)));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PortError::Upstream(format!("Failed to read the rendered PDF: {}", e)))?;
        if bytes.is_empty() {
            return Err(PortError::InvalidResponse(
                "PDF renderer returned an empty document".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }
}
