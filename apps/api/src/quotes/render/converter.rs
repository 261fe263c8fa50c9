//! DOCX → PDF conversion over HTTP.
//!
//! Talks to a LibreOffice-backed conversion service (Gotenberg-compatible:
//! `POST {base}/forms/libreoffice/convert`, multipart field `files`).
//! Retries transport errors and 5xx responses with exponential backoff.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use crate::storage::DOCX_MIME;

const CONVERT_PATH: &str = "/forms/libreoffice/convert";
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("converter error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("converter unavailable after {retries} attempts")]
    Unavailable { retries: u32 },
}

#[derive(Clone)]
pub struct PdfConverter {
    client: Client,
    endpoint: String,
}

impl PdfConverter {
    pub fn new(base_url: &str) -> Result<Self, ConvertError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()?,
            endpoint: convert_endpoint(base_url),
        })
    }

    pub async fn convert(&self, docx: Bytes) -> Result<Bytes, ConvertError> {
        let mut last_error: Option<ConvertError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 500ms, 1s
                let delay = std::time::Duration::from_millis(500 * (1 << (attempt - 1)));
                warn!(
                    "PDF conversion attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let part = Part::bytes(docx.to_vec())
                .file_name("document.docx")
                .mime_str(DOCX_MIME)?;
            let form = Form::new().part("files", part);

            let response = match self.client.post(&self.endpoint).multipart(form).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(ConvertError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = Some(ConvertError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(ConvertError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let pdf = response.bytes().await?;
            debug!("PDF conversion succeeded: {} bytes", pdf.len());
            return Ok(pdf);
        }

        Err(last_error.unwrap_or(ConvertError::Unavailable {
            retries: MAX_RETRIES,
        }))
    }
}

fn convert_endpoint(base_url: &str) -> String {
    format!("{}{CONVERT_PATH}", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_endpoint_trims_trailing_slash() {
        assert_eq!(
            convert_endpoint("http://converter:3000/"),
            "http://converter:3000/forms/libreoffice/convert"
        );
        assert_eq!(
            convert_endpoint("http://converter:3000"),
            "http://converter:3000/forms/libreoffice/convert"
        );
    }

    #[tokio::test]
    async fn test_unreachable_converter_reports_error() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let converter = PdfConverter::new("http://127.0.0.1:9").unwrap();
        tokio::time::pause();
        let result = converter.convert(Bytes::from_static(b"docx")).await;
        assert!(result.is_err());
    }
}
