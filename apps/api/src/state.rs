use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::quotes::render::DocumentRenderer;
use crate::storage::FileStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Template and generated quote files.
    pub files: FileStore,
    /// Pluggable document renderer. Default: DocxRenderer.
    pub renderer: Arc<dyn DocumentRenderer>,
    pub config: Config,
}
