//! Queries for `quote_templates` and `quotes`.

use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::quote::{OutputFormat, QuoteRow, QuoteTemplateRow, TemplateKind};
use crate::placeholder::FieldDescriptor;

const QUOTE_SELECT: &str = r#"
    SELECT q.id, q.template_id, q.customer_name, q.quote_data, q.file_key,
           q.format, q.degraded, q.created_at, qt.name AS template_name
    FROM quotes q
    LEFT JOIN quote_templates qt ON q.template_id = qt.id
"#;

pub struct NewQuoteTemplate<'a> {
    pub name: &'a str,
    pub kind: TemplateKind,
    pub file_key: &'a str,
    pub fields: &'a [FieldDescriptor],
    pub category: &'a str,
}

pub struct NewQuote<'a> {
    pub template_id: Uuid,
    pub customer_name: &'a str,
    pub quote_data: &'a Value,
    pub file_key: &'a str,
    pub format: OutputFormat,
    pub degraded: bool,
}

pub async fn list_templates(pool: &PgPool) -> Result<Vec<QuoteTemplateRow>, AppError> {
    Ok(sqlx::query_as::<_, QuoteTemplateRow>(
        "SELECT * FROM quote_templates ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn get_template(pool: &PgPool, id: Uuid) -> Result<QuoteTemplateRow, AppError> {
    sqlx::query_as::<_, QuoteTemplateRow>("SELECT * FROM quote_templates WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quote template {id} not found")))
}

pub async fn insert_template(
    pool: &PgPool,
    template: NewQuoteTemplate<'_>,
) -> Result<QuoteTemplateRow, AppError> {
    Ok(sqlx::query_as::<_, QuoteTemplateRow>(
        r#"
        INSERT INTO quote_templates (id, name, kind, file_key, fields, category)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(template.name)
    .bind(template.kind.as_str())
    .bind(template.file_key)
    .bind(Json(template.fields))
    .bind(template.category)
    .fetch_one(pool)
    .await?)
}

pub async fn update_template(
    pool: &PgPool,
    id: Uuid,
    name: &str,
    fields: &[FieldDescriptor],
    category: Option<&str>,
) -> Result<QuoteTemplateRow, AppError> {
    sqlx::query_as::<_, QuoteTemplateRow>(
        r#"
        UPDATE quote_templates
        SET name = $1, fields = $2, category = COALESCE($3, category), updated_at = NOW()
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(Json(fields))
    .bind(category)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Quote template {id} not found")))
}

pub async fn replace_template_file(
    pool: &PgPool,
    id: Uuid,
    file_key: &str,
    fields: &[FieldDescriptor],
) -> Result<QuoteTemplateRow, AppError> {
    sqlx::query_as::<_, QuoteTemplateRow>(
        r#"
        UPDATE quote_templates
        SET file_key = $1, kind = $2, fields = $3, updated_at = NOW()
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(file_key)
    .bind(TemplateKind::Docx.as_str())
    .bind(Json(fields))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Quote template {id} not found")))
}

/// Deletes the template row and returns it so the caller can remove its file.
pub async fn delete_template(pool: &PgPool, id: Uuid) -> Result<QuoteTemplateRow, AppError> {
    sqlx::query_as::<_, QuoteTemplateRow>("DELETE FROM quote_templates WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quote template {id} not found")))
}

pub async fn insert_quote(pool: &PgPool, quote: NewQuote<'_>) -> Result<Uuid, AppError> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO quotes (id, template_id, customer_name, quote_data, file_key, format, degraded)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(quote.template_id)
    .bind(quote.customer_name)
    .bind(quote.quote_data)
    .bind(quote.file_key)
    .bind(quote.format.extension())
    .bind(quote.degraded)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn get_quote(pool: &PgPool, id: Uuid) -> Result<QuoteRow, AppError> {
    sqlx::query_as::<_, QuoteRow>(&format!("{QUOTE_SELECT} WHERE q.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quote {id} not found")))
}

pub async fn list_quotes(pool: &PgPool) -> Result<Vec<QuoteRow>, AppError> {
    Ok(
        sqlx::query_as::<_, QuoteRow>(&format!("{QUOTE_SELECT} ORDER BY q.created_at DESC"))
            .fetch_all(pool)
            .await?,
    )
}

pub async fn delete_quote(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
    sqlx::query("DELETE FROM quotes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
