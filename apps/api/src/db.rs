use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("general", "General"),
    ("greeting", "Greeting"),
    ("quotation", "Quotation"),
    ("follow-up", "Follow Up"),
    ("closing", "Closing"),
    ("promotion", "Promotion"),
    ("support", "Support"),
];

const DEFAULT_INDUSTRIES: &[(&str, &str)] = &[
    ("general", "General"),
    ("technology", "Technology"),
    ("real-estate", "Real Estate"),
    ("ecommerce", "E-commerce"),
    ("healthcare", "Healthcare"),
    ("finance", "Finance"),
    ("education", "Education"),
    ("retail", "Retail"),
];

/// (name, content, category, industry)
const SAMPLE_MESSAGE_TEMPLATES: &[(&str, &str, &str, &str)] = &[
    (
        "Customer Greeting - Tech",
        "Hello {{customerName}}!\n\nThank you for your interest in our {{productName}}.\n\n\
         I'm {{salesName}}, and I'll be helping you explore our technology solutions.\n\n\
         Could you tell me more about your specific requirements?",
        "greeting",
        "technology",
    ),
    (
        "Product Quote - Real Estate",
        "Dear {{customerName}},\n\nBased on your requirements, here's the quote for {{propertyName}}:\n\n\
         - Price: {{price}}\n- Location: {{location}}\n- Size: {{size}}\n- Available from: {{availableDate}}\n\n\
         This offer is valid for {{validDays}} days.\n\nBest regards,\n{{salesName}}",
        "quotation",
        "real-estate",
    ),
    (
        "Follow Up - E-commerce",
        "Hi {{customerName}},\n\nI wanted to follow up on the {{productName}} you were interested in.\n\n\
         We currently have a special promotion running until {{promoEndDate}}.\n\n\
         Would you like to schedule a call to discuss this further?\n\nBest,\n{{salesName}}",
        "follow-up",
        "ecommerce",
    ),
];

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Applies pending migrations from `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!()
        .run(pool)
        .await
        .context("Failed to apply database migrations")?;
    info!("Database migrations applied");
    Ok(())
}

/// Inserts default categories, industries and sample templates into empty tables.
pub async fn seed_defaults(pool: &PgPool) -> Result<()> {
    seed_catalog(pool, "categories", DEFAULT_CATEGORIES).await?;
    seed_catalog(pool, "industries", DEFAULT_INDUSTRIES).await?;

    let templates: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM message_templates")
        .fetch_one(pool)
        .await?;
    if templates == 0 {
        for (name, content, category, industry) in SAMPLE_MESSAGE_TEMPLATES {
            sqlx::query(
                "INSERT INTO message_templates (id, name, content, category, industry) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(content)
            .bind(category)
            .bind(industry)
            .execute(pool)
            .await?;
        }
        info!("Inserted {} sample message templates", SAMPLE_MESSAGE_TEMPLATES.len());
    }

    Ok(())
}

async fn seed_catalog(pool: &PgPool, table: &str, rows: &[(&str, &str)]) -> Result<()> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    for (name, label) in rows {
        sqlx::query(&format!(
            "INSERT INTO {table} (id, name, label) VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(label)
        .execute(pool)
        .await?;
    }
    info!("Inserted {} default {table}", rows.len());
    Ok(())
}
