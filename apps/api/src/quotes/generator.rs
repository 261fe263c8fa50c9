//! Quote generation: resolves a template into a downloadable file.
//!
//! Flow: template kind → (text) bracket merge | (docx) renderer →
//!       on `RenderError` → plain-text degraded document.
//!
//! A renderer failure never fails the request. The degraded document is built
//! by the merge engine, which cannot fail.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::quote::{OutputFormat, TemplateKind};
use crate::placeholder::scanner::token_regex;
use crate::placeholder::{merge, FallbackPolicy, FieldDescriptor, ValueMap};
use crate::quotes::render::{DocumentRenderer, RenderError};

pub const DEGRADED_NOTE: &str =
    "Generated as text file - the .docx template has formatting errors, please upload a new template";

const CUSTOMER_NAME_FIELD: &str = "customerName";

/// A stored template loaded for generation.
pub struct TemplateSource<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub kind: TemplateKind,
    pub bytes: Bytes,
    pub fields: &'a [FieldDescriptor],
}

#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub file_name: String,
    pub bytes: Bytes,
    pub format: OutputFormat,
    /// True when the renderer failed and a plain-text fallback was produced.
    pub degraded: bool,
    pub note: Option<String>,
}

/// Produces the quote file for `template`. Never fails.
pub async fn generate_document(
    renderer: &dyn DocumentRenderer,
    template: &TemplateSource<'_>,
    values: &ValueMap,
    requested: OutputFormat,
    now: DateTime<Utc>,
) -> GeneratedDocument {
    let policy = FallbackPolicy::BracketLabel(template.fields);

    if template.kind == TemplateKind::Text {
        let text = String::from_utf8_lossy(&template.bytes);
        return GeneratedDocument {
            file_name: quote_file_name(template.id, OutputFormat::Txt, now),
            bytes: Bytes::from(merge(&text, values, policy)),
            format: OutputFormat::Txt,
            degraded: false,
            note: None,
        };
    }

    match renderer
        .render(template.bytes.clone(), values, template.fields, requested)
        .await
    {
        Ok(doc) => {
            if doc.format != requested {
                info!(
                    "Quote for template {} requested as {requested}, produced as {}",
                    template.id, doc.format
                );
            }
            GeneratedDocument {
                file_name: quote_file_name(template.id, doc.format, now),
                bytes: doc.bytes,
                format: doc.format,
                degraded: false,
                note: None,
            }
        }
        Err(e) => {
            warn!(
                "Rendering template {} failed, generating plain-text quote instead: {}",
                template.id,
                describe_render_error(&e)
            );
            GeneratedDocument {
                file_name: quote_file_name(template.id, OutputFormat::Txt, now),
                bytes: Bytes::from(degraded_text(renderer, template, values, now)),
                format: OutputFormat::Txt,
                degraded: true,
                note: Some(DEGRADED_NOTE.to_string()),
            }
        }
    }
}

/// Plain-text stand-in for a template the renderer could not process.
///
/// Uses the template's own text when it can be extracted and has no broken
/// placeholders; otherwise lists every field as `Label: value`.
fn degraded_text(
    renderer: &dyn DocumentRenderer,
    template: &TemplateSource<'_>,
    values: &ValueMap,
    now: DateTime<Utc>,
) -> String {
    let body_template = match renderer.extract_text(&template.bytes) {
        Ok(text) if !text.trim().is_empty() && !has_broken_placeholder(&text) => text,
        Ok(_) => field_listing(template.fields),
        Err(e) => {
            warn!("Could not extract text from template {}: {e}", template.id);
            field_listing(template.fields)
        }
    };
    let body = merge(
        &body_template,
        values,
        FallbackPolicy::BracketLabel(template.fields),
    );

    format!(
        "QUOTE DOCUMENT\n\nTemplate: {}\nDate: {}\n\n{}\n\n---\nGenerated by Quote Generator\n\nNote: {}\n",
        template.name,
        now.format("%Y-%m-%d"),
        body,
        DEGRADED_NOTE
    )
}

fn has_broken_placeholder(text: &str) -> bool {
    let rest = token_regex().replace_all(text, "");
    rest.contains("{{") || rest.contains("}}")
}

/// `Label: {{name}}` per field, so the listing goes through the same merge.
fn field_listing(fields: &[FieldDescriptor]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {{{{{}}}}}", f.label, f.name))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn customer_name(values: &ValueMap) -> String {
    values
        .get(CUSTOMER_NAME_FIELD)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or("Unknown")
        .to_string()
}

pub fn quote_file_name(template_id: Uuid, format: OutputFormat, now: DateTime<Utc>) -> String {
    format!(
        "quote_{}_{}.{}",
        template_id,
        now.timestamp_millis(),
        format.extension()
    )
}

/// Describes the failure in a form suitable for logs and API notes.
pub fn describe_render_error(e: &RenderError) -> String {
    match e {
        RenderError::UnclosedTag { paragraph } => {
            let preview: String = paragraph.chars().take(60).collect();
            format!("unclosed placeholder near \"{preview}\"")
        }
        other => other.to_string(),
    }
}
