use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row of either `categories` or `industries`; both tables share one shape.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CatalogRow {
    pub id: Uuid,
    pub name: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CatalogUsageRow {
    pub id: Uuid,
    pub name: String,
    pub usage_count: i64,
}
