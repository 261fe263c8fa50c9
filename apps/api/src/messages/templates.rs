use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::messages::Fallback;
use crate::models::message::MessageTemplateRow;
use crate::placeholder::{
    infer, merge_with_report, scan, values_from_json, FallbackPolicy, FieldDescriptor, ValueMap,
};
use crate::state::AppState;

const DEFAULT_TAG: &str = "general";

#[derive(Deserialize, Default)]
pub struct TemplateFilter {
    pub category: Option<String>,
    pub industry: Option<String>,
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateMessageTemplate {
    pub name: String,
    pub content: String,
    pub category: Option<String>,
    pub industry: Option<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Deserialize)]
pub struct UpdateMessageTemplate {
    pub name: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub industry: Option<String>,
}

#[derive(Deserialize)]
pub struct GenerateMessageRequest {
    pub template_id: Uuid,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub fallback: Fallback,
}

#[derive(Deserialize)]
pub struct PreviewMessageRequest {
    pub content: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub fallback: Fallback,
}

#[derive(Debug, Serialize)]
pub struct GeneratedMessage {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    pub variables: ValueMap,
    /// Token names that had no value.
    pub unresolved: Vec<String>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// GET /api/v1/message-templates
pub async fn handle_list_templates(
    State(state): State<AppState>,
    Query(filter): Query<TemplateFilter>,
) -> Result<Json<Vec<MessageTemplateRow>>, AppError> {
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let rows = sqlx::query_as::<_, MessageTemplateRow>(
        r#"
        SELECT * FROM message_templates
        WHERE ($1::text IS NULL OR category = $1)
          AND ($2::text IS NULL OR industry = $2)
          AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%' OR content ILIKE '%' || $3 || '%')
        ORDER BY created_at DESC
        "#,
    )
    .bind(filter.category.as_deref().filter(|c| !c.is_empty()))
    .bind(filter.industry.as_deref().filter(|i| !i.is_empty()))
    .bind(search)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

/// GET /api/v1/message-templates/:id
pub async fn handle_get_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageTemplateRow>, AppError> {
    Ok(Json(fetch_template(&state.db, id).await?))
}

/// POST /api/v1/message-templates
pub async fn handle_create_template(
    State(state): State<AppState>,
    Json(req): Json<CreateMessageTemplate>,
) -> Result<(StatusCode, Json<MessageTemplateRow>), AppError> {
    let name = req.name.trim();
    if name.is_empty() || req.content.trim().is_empty() {
        return Err(AppError::Validation(
            "Template name and content are required".to_string(),
        ));
    }

    let row = sqlx::query_as::<_, MessageTemplateRow>(
        r#"
        INSERT INTO message_templates (id, name, content, category, industry)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(&req.content)
    .bind(tag_or_default(req.category.as_deref()))
    .bind(tag_or_default(req.industry.as_deref()))
    .fetch_one(&state.db)
    .await?;

    info!(
        "Created message template {} with {} placeholders",
        row.id,
        scan(&row.content).len()
    );
    Ok((StatusCode::CREATED, Json(row)))
}

/// PUT /api/v1/message-templates/:id
pub async fn handle_update_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateMessageTemplate>,
) -> Result<Json<MessageTemplateRow>, AppError> {
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty())
        || req.content.as_deref().is_some_and(|c| c.trim().is_empty())
    {
        return Err(AppError::Validation(
            "Template name and content cannot be empty".to_string(),
        ));
    }

    let row = sqlx::query_as::<_, MessageTemplateRow>(
        r#"
        UPDATE message_templates
        SET name = COALESCE($1, name),
            content = COALESCE($2, content),
            category = COALESCE($3, category),
            industry = COALESCE($4, industry),
            updated_at = NOW()
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.content.as_deref())
    .bind(req.category.as_deref())
    .bind(req.industry.as_deref())
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Message template {id} not found")))?;

    Ok(Json(row))
}

/// DELETE /api/v1/message-templates/:id
pub async fn handle_delete_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let deleted = sqlx::query("DELETE FROM message_templates WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(AppError::NotFound(format!("Message template {id} not found")));
    }

    info!("Deleted message template {id}");
    Ok(Json(MessageResponse {
        message: "Template deleted".to_string(),
    }))
}

/// GET /api/v1/message-templates/:id/fields
pub async fn handle_template_fields(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<FieldDescriptor>>, AppError> {
    let template = fetch_template(&state.db, id).await?;
    Ok(Json(infer(&scan(&template.content))))
}

/// POST /api/v1/message-templates/generate
pub async fn handle_generate_message(
    State(state): State<AppState>,
    Json(req): Json<GenerateMessageRequest>,
) -> Result<Json<GeneratedMessage>, AppError> {
    let template = fetch_template(&state.db, req.template_id).await?;
    let mut generated = render_message(&template.content, &req.variables, req.fallback);
    generated.template_name = Some(template.name);
    Ok(Json(generated))
}

/// POST /api/v1/message-templates/preview
///
/// Same as generate but for unsaved content typed into the editor.
pub async fn handle_preview_message(
    Json(req): Json<PreviewMessageRequest>,
) -> Json<GeneratedMessage> {
    Json(render_message(&req.content, &req.variables, req.fallback))
}

fn render_message(content: &str, variables: &Map<String, Value>, fallback: Fallback) -> GeneratedMessage {
    let values = values_from_json(variables);
    let result = match fallback {
        Fallback::Keep => merge_with_report(content, &values, FallbackPolicy::KeepPlaceholder),
        Fallback::Bracket => {
            let fields = infer(&scan(content));
            merge_with_report(content, &values, FallbackPolicy::BracketLabel(&fields))
        }
    };
    if !result.is_complete() {
        debug!("Message generated with unresolved tokens: {:?}", result.unresolved);
    }

    GeneratedMessage {
        message: result.text,
        template_name: None,
        variables: values,
        unresolved: result.unresolved,
    }
}

async fn fetch_template(pool: &PgPool, id: Uuid) -> Result<MessageTemplateRow, AppError> {
    sqlx::query_as::<_, MessageTemplateRow>("SELECT * FROM message_templates WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Message template {id} not found")))
}

fn tag_or_default(tag: Option<&str>) -> &str {
    tag.map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn variables(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_render_message_keeps_missing_by_default() {
        let vars = variables(json!({ "customerName": "Linh" }));
        let out = render_message("Hi {{customerName}}, about {{productName}}", &vars, Fallback::default());
        assert_eq!(out.message, "Hi Linh, about {{productName}}");
        assert_eq!(out.unresolved, vec!["productName"]);
        assert_eq!(out.variables.get("customerName").map(String::as_str), Some("Linh"));
    }

    #[test]
    fn test_render_message_bracket_uses_inferred_label() {
        let vars = variables(json!({}));
        let out = render_message("Hi {{customerName}}", &vars, Fallback::Bracket);
        assert_eq!(out.message, "Hi [Customer Name]");
        assert_eq!(out.unresolved, vec!["customerName"]);
    }

    #[test]
    fn test_render_message_stringifies_numbers() {
        let vars = variables(json!({ "validDays": 30, "price": null }));
        let out = render_message("Valid {{validDays}} days at {{price}}", &vars, Fallback::Keep);
        assert_eq!(out.message, "Valid 30 days at {{price}}");
    }

    #[test]
    fn test_fallback_deserializes_lowercase() {
        let req: PreviewMessageRequest =
            serde_json::from_value(json!({ "content": "x", "fallback": "bracket" })).unwrap();
        assert_eq!(req.fallback, Fallback::Bracket);

        let req: PreviewMessageRequest = serde_json::from_value(json!({ "content": "x" })).unwrap();
        assert_eq!(req.fallback, Fallback::Keep);
        assert!(req.variables.is_empty());
    }

    #[test]
    fn test_tag_or_default() {
        assert_eq!(tag_or_default(None), "general");
        assert_eq!(tag_or_default(Some("  ")), "general");
        assert_eq!(tag_or_default(Some("greeting")), "greeting");
    }
}
