//! Document rendering: turns a stored template plus resolved values into a file.
//!
//! The renderer is a trait seam: `AppState` carries an `Arc<dyn DocumentRenderer>`
//! and the quote orchestration only sees `Result<RenderedDocument, RenderError>`.
//! A render error is never surfaced to the user directly; the orchestration
//! falls back to a plain-text merge (see `quotes::generator`).

pub mod converter;
pub mod docx;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::models::quote::OutputFormat;
use crate::placeholder::{FieldDescriptor, ValueMap};

pub use converter::PdfConverter;
pub use docx::DocxRenderer;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template is not a readable .docx archive: {0}")]
    Archive(String),

    #[error("template has no word/document.xml part")]
    MissingDocumentPart,

    #[error("template XML is malformed: {0}")]
    MalformedXml(String),

    #[error("unclosed placeholder in paragraph: {paragraph:?}")]
    UnclosedTag { paragraph: String },

    #[error("render worker failed: {0}")]
    Worker(String),
}

/// A rendered file and the format it actually ended up in. PDF requests may
/// come back as DOCX when conversion is unavailable.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Bytes,
    pub format: OutputFormat,
}

impl RenderedDocument {
    pub fn new(bytes: impl Into<Bytes>, format: OutputFormat) -> Self {
        Self {
            bytes: bytes.into(),
            format,
        }
    }
}

/// Renders a template file. Implement this to swap rendering backends without
/// touching handlers or the generation flow.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Renders `template` with `values`. Tokens without a value are written as
    /// `[Label]` using `fields`.
    async fn render(
        &self,
        template: Bytes,
        values: &ValueMap,
        fields: &[FieldDescriptor],
        format: OutputFormat,
    ) -> Result<RenderedDocument, RenderError>;

    /// Extracts the template's plain text, one paragraph per block.
    fn extract_text(&self, template: &[u8]) -> Result<String, RenderError>;
}
