use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::catalog::{slugify, CatalogKind};
use crate::errors::{is_unique_violation, AppError};
use crate::models::catalog::{CatalogRow, CatalogUsageRow};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateCatalogEntry {
    pub name: String,
    pub label: String,
}

#[derive(Deserialize)]
pub struct UpdateCatalogEntry {
    pub label: String,
}

#[derive(Deserialize)]
pub struct BulkCreateRequest {
    #[serde(alias = "categories", alias = "industries")]
    pub items: Vec<CreateCatalogEntry>,
}

#[derive(Serialize)]
pub struct BulkCreateResponse {
    pub created: Vec<CatalogRow>,
    pub errors: Vec<String>,
    pub message: String,
}

#[derive(Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub deleted_count: u64,
}

/// GET /api/v1/{categories|industries}
pub async fn handle_list(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
) -> Result<Json<Vec<CatalogRow>>, AppError> {
    let rows = sqlx::query_as::<_, CatalogRow>(&format!(
        "SELECT * FROM {} ORDER BY label",
        kind.table()
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

/// POST /api/v1/{categories|industries}
pub async fn handle_create(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    Json(req): Json<CreateCatalogEntry>,
) -> Result<(StatusCode, Json<CatalogRow>), AppError> {
    let (name, label) = normalize_entry(&req).map_err(AppError::Validation)?;

    let row = insert_entry(&state.db, kind, &name, &label)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("{} '{name}' already exists", kind.noun()))
            } else {
                AppError::Database(e)
            }
        })?;

    info!("Created {} '{}'", kind.table(), row.name);
    Ok((StatusCode::CREATED, Json(row)))
}

/// PUT /api/v1/{categories|industries}/:id
pub async fn handle_update(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCatalogEntry>,
) -> Result<Json<CatalogRow>, AppError> {
    let label = req.label.trim();
    if label.is_empty() {
        return Err(AppError::Validation("Label is required".to_string()));
    }

    let row = sqlx::query_as::<_, CatalogRow>(&format!(
        "UPDATE {} SET label = $1 WHERE id = $2 RETURNING *",
        kind.table()
    ))
    .bind(label)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("{} {id} not found", kind.noun())))?;

    Ok(Json(row))
}

/// DELETE /api/v1/{categories|industries}/:id
///
/// Refused while any message template still references the entry by name.
pub async fn handle_delete(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    let usage = usage_of(&state.db, kind, &[id]).await?;
    let entry = usage
        .first()
        .ok_or_else(|| AppError::NotFound(format!("{} {id} not found", kind.noun())))?;
    if entry.usage_count > 0 {
        return Err(AppError::Validation(format!(
            "Cannot delete {} '{}'. It is being used by {} template(s)",
            kind.noun().to_lowercase(),
            entry.name,
            entry.usage_count
        )));
    }

    let deleted = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", kind.table()))
        .bind(id)
        .execute(&state.db)
        .await?
        .rows_affected();

    info!("Deleted {} {id}", kind.table());
    Ok(Json(DeleteResponse {
        message: format!("{} deleted", kind.noun()),
        deleted_count: deleted,
    }))
}

/// POST /api/v1/{categories|industries}/bulk
///
/// Inserts each item independently; failures are reported per item and do
/// not stop the rest.
pub async fn handle_bulk_create(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    Json(req): Json<BulkCreateRequest>,
) -> Result<Json<BulkCreateResponse>, AppError> {
    if req.items.is_empty() {
        return Err(AppError::Validation("Items array is required".to_string()));
    }

    let mut created = Vec::new();
    let mut errors = Vec::new();

    for (i, item) in req.items.iter().enumerate() {
        let (name, label) = match normalize_entry(item) {
            Ok(entry) => entry,
            Err(msg) => {
                errors.push(format!("Item {}: {msg}", i + 1));
                continue;
            }
        };

        match insert_entry(&state.db, kind, &name, &label).await {
            Ok(row) => created.push(row),
            Err(e) if is_unique_violation(&e) => errors.push(format!(
                "Item {}: {} \"{}\" already exists",
                i + 1,
                kind.noun(),
                item.name
            )),
            Err(e) => errors.push(format!("Item {}: {e}", i + 1)),
        }
    }

    info!(
        "Bulk created {} {} ({} errors)",
        created.len(),
        kind.table(),
        errors.len()
    );

    Ok(Json(BulkCreateResponse {
        message: bulk_create_message(kind, created.len(), errors.len()),
        created,
        errors,
    }))
}

/// DELETE /api/v1/{categories|industries}/bulk
///
/// All-or-nothing: nothing is deleted when any entry is still in use.
pub async fn handle_bulk_delete(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    Json(req): Json<BulkDeleteRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    if req.ids.is_empty() {
        return Err(AppError::Validation("IDs array is required".to_string()));
    }

    let in_use: Vec<String> = usage_of(&state.db, kind, &req.ids)
        .await?
        .into_iter()
        .filter(|row| row.usage_count > 0)
        .map(|row| format!("{} ({})", row.name, row.usage_count))
        .collect();
    if !in_use.is_empty() {
        return Err(AppError::Validation(format!(
            "Some {} are being used and cannot be deleted: {}",
            kind.table(),
            in_use.join(", ")
        )));
    }

    let deleted = sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", kind.table()))
        .bind(&req.ids)
        .execute(&state.db)
        .await?
        .rows_affected();

    info!("Bulk deleted {deleted} {}", kind.table());
    Ok(Json(DeleteResponse {
        message: format!("Deleted {deleted} {} successfully", kind.table()),
        deleted_count: deleted,
    }))
}

async fn insert_entry(
    pool: &PgPool,
    kind: CatalogKind,
    name: &str,
    label: &str,
) -> Result<CatalogRow, sqlx::Error> {
    sqlx::query_as::<_, CatalogRow>(&format!(
        "INSERT INTO {} (id, name, label) VALUES ($1, $2, $3) RETURNING *",
        kind.table()
    ))
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(label)
    .fetch_one(pool)
    .await
}

/// Template usage counts for the given entries. Unknown ids are absent.
async fn usage_of(
    pool: &PgPool,
    kind: CatalogKind,
    ids: &[Uuid],
) -> Result<Vec<CatalogUsageRow>, sqlx::Error> {
    sqlx::query_as::<_, CatalogUsageRow>(&format!(
        r#"
        SELECT c.id, c.name, COUNT(mt.id) AS usage_count
        FROM {table} c
        LEFT JOIN message_templates mt ON mt.{column} = c.name
        WHERE c.id = ANY($1)
        GROUP BY c.id, c.name
        "#,
        table = kind.table(),
        column = kind.template_column()
    ))
    .bind(ids)
    .fetch_all(pool)
    .await
}

/// Slugified name and trimmed label, or the reason the entry is unusable.
fn normalize_entry(entry: &CreateCatalogEntry) -> Result<(String, String), String> {
    let name = slugify(&entry.name);
    let label = entry.label.trim();
    if name.is_empty() || label.is_empty() {
        return Err("Name and label are required".to_string());
    }
    Ok((name, label.to_string()))
}

fn bulk_create_message(kind: CatalogKind, created: usize, errors: usize) -> String {
    if errors > 0 {
        format!("Created {created} {} with {errors} errors", kind.table())
    } else {
        format!("Created {created} {}", kind.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, label: &str) -> CreateCatalogEntry {
        CreateCatalogEntry {
            name: name.to_string(),
            label: label.to_string(),
        }
    }

    #[test]
    fn test_normalize_entry_slugifies_name() {
        let (name, label) = normalize_entry(&entry("Real Estate", " Real Estate ")).unwrap();
        assert_eq!(name, "real-estate");
        assert_eq!(label, "Real Estate");
    }

    #[test]
    fn test_normalize_entry_requires_name_and_label() {
        assert!(normalize_entry(&entry("  ", "Label")).is_err());
        assert!(normalize_entry(&entry("name", "")).is_err());
    }

    #[test]
    fn test_bulk_request_accepts_table_named_key() {
        let req: BulkCreateRequest = serde_json::from_value(serde_json::json!({
            "industries": [{ "name": "Logistics", "label": "Logistics" }]
        }))
        .unwrap();
        assert_eq!(req.items.len(), 1);

        let req: BulkCreateRequest = serde_json::from_value(serde_json::json!({
            "items": [{ "name": "a", "label": "A" }, { "name": "b", "label": "B" }]
        }))
        .unwrap();
        assert_eq!(req.items.len(), 2);
    }

    #[test]
    fn test_bulk_create_message_mentions_errors() {
        assert_eq!(
            bulk_create_message(CatalogKind::Categories, 2, 0),
            "Created 2 categories"
        );
        assert_eq!(
            bulk_create_message(CatalogKind::Industries, 1, 2),
            "Created 1 industries with 2 errors"
        );
    }
}
