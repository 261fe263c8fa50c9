use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::types::Json as JsonColumn;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::messages::templates::MessageResponse;
use crate::models::message::{SavedMessageLoadRow, SavedMessageRow};
use crate::placeholder::values_from_json;
use crate::state::AppState;

const SAVED_SELECT: &str = r#"
    SELECT sm.*, mt.name AS original_template_name
    FROM saved_messages sm
    LEFT JOIN message_templates mt ON sm.template_id = mt.id
"#;

#[derive(Deserialize)]
pub struct CreateSavedMessage {
    pub name: String,
    pub template_id: Option<Uuid>,
    pub template_name: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
    pub final_message: String,
    pub category: Option<String>,
    pub industry: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateSavedMessage {
    pub name: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
    pub final_message: String,
    pub category: Option<String>,
    pub industry: Option<String>,
}

/// GET /api/v1/saved-messages
pub async fn handle_list_saved(
    State(state): State<AppState>,
) -> Result<Json<Vec<SavedMessageRow>>, AppError> {
    let rows = sqlx::query_as::<_, SavedMessageRow>(&format!(
        "{SAVED_SELECT} ORDER BY sm.created_at DESC"
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

/// GET /api/v1/saved-messages/:id
pub async fn handle_get_saved(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SavedMessageRow>, AppError> {
    Ok(Json(fetch_saved(&state.db, id).await?))
}

/// POST /api/v1/saved-messages
pub async fn handle_create_saved(
    State(state): State<AppState>,
    Json(req): Json<CreateSavedMessage>,
) -> Result<(StatusCode, Json<SavedMessageRow>), AppError> {
    require_filled(&[
        ("name", &req.name),
        ("template_name", &req.template_name),
        ("final_message", &req.final_message),
    ])?;

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO saved_messages
            (id, name, template_id, template_name, variables, final_message, category, industry)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id)
    .bind(req.name.trim())
    .bind(req.template_id)
    .bind(&req.template_name)
    .bind(JsonColumn(values_from_json(&req.variables)))
    .bind(&req.final_message)
    .bind(req.category.as_deref().unwrap_or("general"))
    .bind(req.industry.as_deref().unwrap_or("general"))
    .execute(&state.db)
    .await?;

    info!("Saved message {id} from template '{}'", req.template_name);
    Ok((StatusCode::CREATED, Json(fetch_saved(&state.db, id).await?)))
}

/// PUT /api/v1/saved-messages/:id
pub async fn handle_update_saved(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSavedMessage>,
) -> Result<Json<SavedMessageRow>, AppError> {
    require_filled(&[("name", &req.name), ("final_message", &req.final_message)])?;

    let updated = sqlx::query(
        r#"
        UPDATE saved_messages
        SET name = $1, variables = $2, final_message = $3,
            category = $4, industry = $5, updated_at = NOW()
        WHERE id = $6
        "#,
    )
    .bind(req.name.trim())
    .bind(JsonColumn(values_from_json(&req.variables)))
    .bind(&req.final_message)
    .bind(req.category.as_deref().unwrap_or("general"))
    .bind(req.industry.as_deref().unwrap_or("general"))
    .bind(id)
    .execute(&state.db)
    .await?
    .rows_affected();
    if updated == 0 {
        return Err(AppError::NotFound(format!("Saved message {id} not found")));
    }

    Ok(Json(fetch_saved(&state.db, id).await?))
}

/// DELETE /api/v1/saved-messages/:id
pub async fn handle_delete_saved(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let deleted = sqlx::query("DELETE FROM saved_messages WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(AppError::NotFound(format!("Saved message {id} not found")));
    }

    info!("Deleted saved message {id}");
    Ok(Json(MessageResponse {
        message: "Saved message deleted".to_string(),
    }))
}

/// POST /api/v1/saved-messages/:id/load
///
/// Returns the stored variables with the template's current content so the
/// editor can be restored. `template_content` is null once the template is gone.
pub async fn handle_load_saved(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SavedMessageLoadRow>, AppError> {
    let row = sqlx::query_as::<_, SavedMessageLoadRow>(
        r#"
        SELECT sm.template_id, sm.template_name, mt.content AS template_content,
               sm.variables, sm.final_message, sm.category, sm.industry
        FROM saved_messages sm
        LEFT JOIN message_templates mt ON sm.template_id = mt.id
        WHERE sm.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Saved message {id} not found")))?;

    Ok(Json(row))
}

async fn fetch_saved(pool: &PgPool, id: Uuid) -> Result<SavedMessageRow, AppError> {
    sqlx::query_as::<_, SavedMessageRow>(&format!("{SAVED_SELECT} WHERE sm.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Saved message {id} not found")))
}

fn require_filled(fields: &[(&str, &String)]) -> Result<(), AppError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_filled_lists_blank_fields() {
        let name = "Follow up".to_string();
        let blank = "  ".to_string();
        assert!(require_filled(&[("name", &name)]).is_ok());

        let err = require_filled(&[("name", &name), ("final_message", &blank)]).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("final_message")));
    }

    #[test]
    fn test_create_request_variables_default_empty() {
        let req: CreateSavedMessage = serde_json::from_value(serde_json::json!({
            "name": "Draft",
            "template_name": "Greeting",
            "final_message": "Hello"
        }))
        .unwrap();
        assert!(req.variables.is_empty());
        assert!(req.template_id.is_none());
    }

    #[test]
    fn test_variables_accept_loose_json() {
        let req: UpdateSavedMessage = serde_json::from_value(serde_json::json!({
            "name": "Quote follow-up",
            "variables": { "validDays": 30, "customerName": "Ann", "note": null },
            "final_message": "Valid for 30 days"
        }))
        .unwrap();

        let stored = values_from_json(&req.variables);
        assert_eq!(stored.get("validDays").map(String::as_str), Some("30"));
        assert_eq!(stored.get("customerName").map(String::as_str), Some("Ann"));
        assert!(!stored.contains_key("note"));
    }
}
