use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::placeholder::ValueMap;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageTemplateRow {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    pub category: String,
    pub industry: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A saved message joined with the name of the template it came from, if that
/// template still exists.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SavedMessageRow {
    pub id: Uuid,
    pub name: String,
    pub template_id: Option<Uuid>,
    pub template_name: String,
    pub variables: Json<ValueMap>,
    pub final_message: String,
    pub category: String,
    pub industry: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub original_template_name: Option<String>,
}

/// Saved message plus the current content of its template, for loading back
/// into the editor.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SavedMessageLoadRow {
    pub template_id: Option<Uuid>,
    pub template_name: String,
    pub template_content: Option<String>,
    pub variables: Json<ValueMap>,
    pub final_message: String,
    pub category: String,
    pub industry: String,
}
