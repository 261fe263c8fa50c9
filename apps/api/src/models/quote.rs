use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::placeholder::FieldDescriptor;

/// How a stored quote template file is interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Word document; tokens live in `word/document.xml` text runs.
    Docx,
    /// UTF-8 plain text merged directly.
    Text,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Docx => "docx",
            TemplateKind::Text => "text",
        }
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docx" => Ok(TemplateKind::Docx),
            "text" => Ok(TemplateKind::Text),
            other => Err(format!("unknown template kind '{other}'")),
        }
    }
}

/// Format of a generated quote file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Docx,
    Pdf,
    Html,
    Txt,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Docx => "docx",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Html => "html",
            OutputFormat::Txt => "txt",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Docx => crate::storage::DOCX_MIME,
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Html => "text/html; charset=utf-8",
            OutputFormat::Txt => "text/plain; charset=utf-8",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docx" => Ok(OutputFormat::Docx),
            "pdf" => Ok(OutputFormat::Pdf),
            "html" => Ok(OutputFormat::Html),
            "txt" => Ok(OutputFormat::Txt),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuoteTemplateRow {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub file_key: String,
    pub fields: Json<Vec<FieldDescriptor>>,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuoteTemplateRow {
    /// Parses the stored kind; an unknown value means the row was written
    /// outside this service.
    pub fn template_kind(&self) -> anyhow::Result<TemplateKind> {
        self.kind
            .parse()
            .map_err(|e: String| anyhow::anyhow!("quote template {}: {e}", self.id))
    }
}

/// A generated quote joined with the name of its template.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuoteRow {
    pub id: Uuid,
    pub template_id: Option<Uuid>,
    pub customer_name: String,
    pub quote_data: Value,
    pub file_key: String,
    pub format: String,
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
    pub template_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_kind_round_trips_through_str() {
        for kind in [TemplateKind::Docx, TemplateKind::Text] {
            assert_eq!(kind.as_str().parse::<TemplateKind>().unwrap(), kind);
        }
        assert!("pdf".parse::<TemplateKind>().is_err());
    }

    #[test]
    fn test_output_format_defaults_to_docx() {
        assert_eq!(OutputFormat::default(), OutputFormat::Docx);
        let parsed: OutputFormat = serde_json::from_str("\"pdf\"").unwrap();
        assert_eq!(parsed, OutputFormat::Pdf);
        assert_eq!(parsed.to_string(), "pdf");
    }
}
