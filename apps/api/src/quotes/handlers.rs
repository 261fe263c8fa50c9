use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::quote::{OutputFormat, QuoteRow, QuoteTemplateRow, TemplateKind};
use crate::placeholder::{
    infer, merge, reconcile, scan, validate_fields, values_from_json, FallbackPolicy,
    FieldDescriptor, FieldType, ValueMap,
};
use crate::quotes::generator::{customer_name, generate_document, TemplateSource};
use crate::quotes::render::docx::{paragraphs_to_html, validate_template};
use crate::quotes::render::DocumentRenderer;
use crate::quotes::store::{self, NewQuote, NewQuoteTemplate};
use crate::state::AppState;
use crate::storage::{file_name_of, generated_key, template_key, FileStore, DOCX_MIME};

const DEFAULT_CATEGORY: &str = "general";
const CLEAN_TEMPLATE_NAME: &str = "Simple Quote Template";

const CLEAN_TEMPLATE_BODY: &str = "QUOTE DOCUMENT

Customer: {{customerName}}
Company: {{companyName}}
Project: {{projectName}}
Price: {{price}}
Valid Until: {{validUntil}}

Description:
{{description}}

---
Generated by Quote Generator
";

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TemplateUploadResponse {
    pub template: QuoteTemplateRow,
    pub placeholders: Vec<String>,
    pub message: String,
}

#[derive(Deserialize)]
pub struct CreateCleanRequest {
    pub name: Option<String>,
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateTemplateRequest {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Serialize)]
pub struct PreviewResponse {
    pub content: String,
    pub html_content: String,
    pub original_content: String,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Deserialize)]
pub struct GenerateQuoteRequest {
    pub template_id: Uuid,
    #[serde(default)]
    pub quote_data: Map<String, Value>,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Serialize)]
pub struct GenerateQuoteResponse {
    pub success: bool,
    pub quote_id: Uuid,
    pub file_name: String,
    pub download_url: String,
    pub format: OutputFormat,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// GET /api/v1/quotes/templates
pub async fn handle_list_templates(
    State(state): State<AppState>,
) -> Result<Json<Vec<QuoteTemplateRow>>, AppError> {
    Ok(Json(store::list_templates(&state.db).await?))
}

/// GET /api/v1/quotes/templates/:id
pub async fn handle_get_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuoteTemplateRow>, AppError> {
    Ok(Json(store::get_template(&state.db, id).await?))
}

/// POST /api/v1/quotes/templates/upload
pub async fn handle_upload_template(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<TemplateUploadResponse>), AppError> {
    let upload = read_template_upload(multipart, state.config.max_upload_bytes).await?;
    let file = upload
        .file
        .ok_or_else(|| AppError::Validation("No template file uploaded".to_string()))?;
    let name = upload
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::Validation("Template name is required".to_string()))?;
    ensure_docx(&file)?;

    let text = template_text(&state.renderer, file.bytes.clone()).await?;
    let placeholders = scan(&text);
    let fields = infer(&placeholders);

    let file_key = template_key(&file.file_name);
    state.files.put(&file_key, file.bytes, DOCX_MIME).await?;

    let category = upload.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let template = insert_or_discard(
        store::insert_template(
            &state.db,
            NewQuoteTemplate {
                name: &name,
                kind: TemplateKind::Docx,
                file_key: &file_key,
                fields: &fields,
                category: &category,
            },
        ),
        remove_file(&state.files, &file_key),
    )
    .await?;

    info!(
        "Uploaded quote template {} '{}' with {} placeholders",
        template.id,
        template.name,
        placeholders.len()
    );

    Ok((
        StatusCode::CREATED,
        Json(TemplateUploadResponse {
            message: format!("Template uploaded, found {} placeholders", placeholders.len()),
            template,
            placeholders,
        }),
    ))
}

/// POST /api/v1/quotes/templates/create-clean
pub async fn handle_create_clean_template(
    State(state): State<AppState>,
    Json(req): Json<CreateCleanRequest>,
) -> Result<(StatusCode, Json<TemplateUploadResponse>), AppError> {
    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| CLEAN_TEMPLATE_NAME.to_string());
    let category = req.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let fields = clean_template_fields();

    let file_key = format!(
        "templates/simple_template_{}.txt",
        Utc::now().timestamp_millis()
    );
    state
        .files
        .put(
            &file_key,
            Bytes::from_static(CLEAN_TEMPLATE_BODY.as_bytes()),
            OutputFormat::Txt.mime_type(),
        )
        .await?;

    let template = insert_or_discard(
        store::insert_template(
            &state.db,
            NewQuoteTemplate {
                name: &name,
                kind: TemplateKind::Text,
                file_key: &file_key,
                fields: &fields,
                category: &category,
            },
        ),
        remove_file(&state.files, &file_key),
    )
    .await?;

    info!("Created clean quote template {}", template.id);

    Ok((
        StatusCode::CREATED,
        Json(TemplateUploadResponse {
            template,
            placeholders: scan(CLEAN_TEMPLATE_BODY),
            message: "Simple template created".to_string(),
        }),
    ))
}

/// PUT /api/v1/quotes/templates/:id
pub async fn handle_update_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTemplateRequest>,
) -> Result<Json<QuoteTemplateRow>, AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Template name is required".to_string()));
    }
    validate_fields(&req.fields).map_err(AppError::Validation)?;

    let template =
        store::update_template(&state.db, id, name, &req.fields, req.category.as_deref()).await?;
    Ok(Json(template))
}

/// POST /api/v1/quotes/templates/:id/upload
///
/// Replaces the template file. The new file must render with no values
/// supplied; descriptor edits survive for names still present.
pub async fn handle_replace_template_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<TemplateUploadResponse>, AppError> {
    let existing = store::get_template(&state.db, id).await?;

    let upload = read_template_upload(multipart, state.config.max_upload_bytes).await?;
    let file = upload
        .file
        .ok_or_else(|| AppError::Validation("No template file uploaded".to_string()))?;
    ensure_docx(&file)?;

    let bytes = file.bytes.clone();
    tokio::task::spawn_blocking(move || validate_template(&bytes))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .map_err(|e| AppError::Validation(format!("Template is not valid: {e}")))?;

    let text = template_text(&state.renderer, file.bytes.clone()).await?;
    let placeholders = scan(&text);
    let fields = reconcile(&existing.fields.0, infer(&placeholders));

    let file_key = template_key(&file.file_name);
    state.files.put(&file_key, file.bytes, DOCX_MIME).await?;
    let template = insert_or_discard(
        store::replace_template_file(&state.db, id, &file_key, &fields),
        remove_file(&state.files, &file_key),
    )
    .await?;
    remove_file(&state.files, &existing.file_key).await;

    info!("Replaced file of quote template {id}");

    Ok(Json(TemplateUploadResponse {
        message: format!("Template file replaced, found {} placeholders", placeholders.len()),
        template,
        placeholders,
    }))
}

/// DELETE /api/v1/quotes/templates/:id
pub async fn handle_delete_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let template = store::delete_template(&state.db, id).await?;
    remove_file(&state.files, &template.file_key).await;

    info!("Deleted quote template {id}");
    Ok(Json(MessageResponse {
        message: "Template deleted".to_string(),
    }))
}

/// POST /api/v1/quotes/templates/:id/preview
///
/// Missing values stay as `{{name}}` so the caller can see what is left.
pub async fn handle_preview_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, AppError> {
    let template = store::get_template(&state.db, id).await?;
    let bytes = state.files.get(&template.file_key).await?;

    let original_content = match template.template_kind()? {
        TemplateKind::Text => String::from_utf8_lossy(&bytes).into_owned(),
        TemplateKind::Docx => template_text(&state.renderer, bytes).await?,
    };

    let values = values_from_json(&req.data);
    Ok(Json(preview_of(&original_content, &values, template.fields.0)))
}

fn preview_of(original: &str, values: &ValueMap, fields: Vec<FieldDescriptor>) -> PreviewResponse {
    let content = merge(original, values, FallbackPolicy::KeepPlaceholder);
    let paragraphs: Vec<String> = content.split("\n\n").map(str::to_string).collect();
    PreviewResponse {
        html_content: paragraphs_to_html(&paragraphs),
        content,
        original_content: original.to_string(),
        fields,
    }
}

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

/// POST /api/v1/quotes/generate
pub async fn handle_generate_quote(
    State(state): State<AppState>,
    Json(req): Json<GenerateQuoteRequest>,
) -> Result<Json<GenerateQuoteResponse>, AppError> {
    let template = store::get_template(&state.db, req.template_id).await?;
    let bytes = state.files.get(&template.file_key).await?;
    let values = values_from_json(&req.quote_data);

    let source = TemplateSource {
        id: template.id,
        name: &template.name,
        kind: template.template_kind()?,
        bytes,
        fields: &template.fields.0,
    };
    let document =
        generate_document(state.renderer.as_ref(), &source, &values, req.format, Utc::now()).await;

    let file_key = generated_key(&document.file_name);
    state
        .files
        .put(&file_key, document.bytes, document.format.mime_type())
        .await?;

    let customer = customer_name(&values);
    let quote_id = store::insert_quote(
        &state.db,
        NewQuote {
            template_id: template.id,
            customer_name: &customer,
            quote_data: &Value::Object(req.quote_data),
            file_key: &file_key,
            format: document.format,
            degraded: document.degraded,
        },
    )
    .await?;

    info!(
        "Generated quote {quote_id} from template {} as {}{}",
        template.id,
        document.format,
        if document.degraded { " (degraded)" } else { "" }
    );

    Ok(Json(GenerateQuoteResponse {
        success: true,
        quote_id,
        download_url: format!("/api/v1/quotes/download/{quote_id}"),
        file_name: document.file_name,
        format: document.format,
        degraded: document.degraded,
        message: document.note,
    }))
}

/// GET /api/v1/quotes/download/:quote_id
pub async fn handle_download_quote(
    State(state): State<AppState>,
    Path(quote_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let quote = store::get_quote(&state.db, quote_id).await?;
    let bytes = state.files.get(&quote.file_key).await?;
    let format: OutputFormat = quote
        .format
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;

    let disposition = format!("attachment; filename=\"{}\"", file_name_of(&quote.file_key));
    Ok((
        [
            (header::CONTENT_TYPE, format.mime_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// GET /api/v1/quotes/history
pub async fn handle_quote_history(
    State(state): State<AppState>,
) -> Result<Json<Vec<QuoteRow>>, AppError> {
    Ok(Json(store::list_quotes(&state.db).await?))
}

/// DELETE /api/v1/quotes/:id
pub async fn handle_delete_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let quote = store::get_quote(&state.db, id).await?;
    state.files.delete(&quote.file_key).await?;
    store::delete_quote(&state.db, id).await?;

    info!("Deleted quote {id}");
    Ok(Json(MessageResponse {
        message: "Quote deleted".to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Upload helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TemplateUpload {
    name: Option<String>,
    category: Option<String>,
    file: Option<UploadedFile>,
}

struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    bytes: Bytes,
}

async fn read_template_upload(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<TemplateUpload, AppError> {
    let mut upload = TemplateUpload::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => upload.name = Some(field.text().await?.trim().to_string()),
            "category" => {
                let category = field.text().await?.trim().to_string();
                if !category.is_empty() {
                    upload.category = Some(category);
                }
            }
            "template" => {
                let file_name = field.file_name().unwrap_or("template.docx").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                if bytes.len() > max_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "Template file is {} bytes, the limit is {max_bytes}",
                        bytes.len()
                    )));
                }
                upload.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            _ => {}
        }
    }

    Ok(upload)
}

/// Plain text of a DOCX template, extracted off the async runtime.
async fn template_text(
    renderer: &Arc<dyn DocumentRenderer>,
    bytes: Bytes,
) -> Result<String, AppError> {
    let renderer = Arc::clone(renderer);
    tokio::task::spawn_blocking(move || renderer.extract_text(&bytes))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .map_err(|e| AppError::Validation(format!("Could not read template: {e}")))
}

/// Awaits `write`; when it fails, awaits `discard` before returning the error.
/// Keeps a freshly stored file from outliving a failed row write.
async fn insert_or_discard<T>(
    write: impl Future<Output = Result<T, AppError>>,
    discard: impl Future<Output = ()>,
) -> Result<T, AppError> {
    match write.await {
        Ok(row) => Ok(row),
        Err(e) => {
            discard.await;
            Err(e)
        }
    }
}

/// Deletes a stored file once its row is gone. Failures are logged only.
async fn remove_file(files: &FileStore, key: &str) {
    if let Err(e) = files.delete(key).await {
        warn!("Could not remove stored file {key}: {e}");
    }
}

fn ensure_docx(file: &UploadedFile) -> Result<(), AppError> {
    if is_docx(&file.file_name, file.content_type.as_deref()) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "Only .docx template files are accepted".to_string(),
        ))
    }
}

fn is_docx(file_name: &str, content_type: Option<&str>) -> bool {
    content_type == Some(DOCX_MIME) || file_name.to_ascii_lowercase().ends_with(".docx")
}

/// Field list of the built-in text template.
fn clean_template_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::inferred("customerName"),
        FieldDescriptor::inferred("companyName"),
        FieldDescriptor::inferred("projectName"),
        FieldDescriptor::inferred("price"),
        FieldDescriptor::inferred("description").with_type(FieldType::Textarea),
        FieldDescriptor::inferred("validUntil").with_type(FieldType::Date),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::render::docx::fixtures::docx_with_paragraphs;
    use crate::quotes::render::DocxRenderer;

    #[test]
    fn test_is_docx_by_content_type_or_extension() {
        assert!(is_docx("quote.docx", None));
        assert!(is_docx("QUOTE.DOCX", Some("application/octet-stream")));
        assert!(is_docx("upload", Some(DOCX_MIME)));
        assert!(!is_docx("quote.pdf", Some("application/pdf")));
        assert!(!is_docx("quote.doc", None));
    }

    #[test]
    fn test_clean_template_fields_cover_every_token() {
        let fields = clean_template_fields();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        let mut tokens = scan(CLEAN_TEMPLATE_BODY);
        tokens.sort();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(tokens, sorted);
        assert!(validate_fields(&fields).is_ok());
    }

    #[test]
    fn test_clean_template_fields_have_type_overrides() {
        let fields = clean_template_fields();
        let description = fields.iter().find(|f| f.name == "description").unwrap();
        let valid_until = fields.iter().find(|f| f.name == "validUntil").unwrap();
        assert_eq!(description.field_type, FieldType::Textarea);
        assert_eq!(valid_until.field_type, FieldType::Date);
        assert_eq!(valid_until.label, "Valid Until");
    }

    #[test]
    fn test_preview_keeps_unfilled_placeholders() {
        let mut values = ValueMap::new();
        values.insert("customerName".to_string(), "Acme & Co".to_string());
        let original = "Dear {{customerName}},\n\nTotal: {{price}}";

        let preview = preview_of(original, &values, Vec::new());

        assert_eq!(preview.content, "Dear Acme & Co,\n\nTotal: {{price}}");
        assert_eq!(preview.original_content, original);
        assert_eq!(
            preview.html_content,
            "<p>Dear Acme &amp; Co,</p>\n<p>Total: {{price}}</p>"
        );
    }

    #[tokio::test]
    async fn test_failed_row_write_discards_stored_file() {
        let mut discarded = false;
        let result: Result<(), AppError> = insert_or_discard(
            async { Err(AppError::Conflict("row rejected".to_string())) },
            async { discarded = true },
        )
        .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(discarded);
    }

    #[tokio::test]
    async fn test_successful_row_write_keeps_stored_file() {
        let mut discarded = false;
        let result = insert_or_discard(async { Ok(7) }, async { discarded = true }).await;
        assert_eq!(result.unwrap(), 7);
        assert!(!discarded);
    }

    #[tokio::test]
    async fn test_template_text_runs_renderer_off_runtime() {
        let renderer: Arc<dyn DocumentRenderer> = Arc::new(DocxRenderer::new(None));
        let docx = Bytes::from(docx_with_paragraphs(&[&["Hi {{name}}"], &["Bye"]]));

        let text = template_text(&renderer, docx).await.unwrap();
        assert_eq!(text, "Hi {{name}}\n\nBye");

        let err = template_text(&renderer, Bytes::from_static(b"not a docx"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_generate_request_defaults_to_docx() {
        let req: GenerateQuoteRequest = serde_json::from_value(serde_json::json!({
            "template_id": Uuid::nil(),
            "quote_data": { "customerName": "Acme" }
        }))
        .unwrap();
        assert_eq!(req.format, OutputFormat::Docx);
        assert_eq!(req.quote_data.len(), 1);
    }
}
