pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Extension, Router,
};

use crate::catalog::{self, CatalogKind};
use crate::messages::{saved, templates};
use crate::quotes::handlers as quotes;
use crate::state::AppState;

/// Headroom above the file size limit for the other multipart parts.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        // Catalog
        .nest("/api/v1/categories", catalog_routes(CatalogKind::Categories))
        .nest("/api/v1/industries", catalog_routes(CatalogKind::Industries))
        // Message templates
        .route(
            "/api/v1/message-templates",
            get(templates::handle_list_templates).post(templates::handle_create_template),
        )
        .route(
            "/api/v1/message-templates/generate",
            post(templates::handle_generate_message),
        )
        .route(
            "/api/v1/message-templates/preview",
            post(templates::handle_preview_message),
        )
        .route(
            "/api/v1/message-templates/:id",
            get(templates::handle_get_template)
                .put(templates::handle_update_template)
                .delete(templates::handle_delete_template),
        )
        .route(
            "/api/v1/message-templates/:id/fields",
            get(templates::handle_template_fields),
        )
        // Saved messages
        .route(
            "/api/v1/saved-messages",
            get(saved::handle_list_saved).post(saved::handle_create_saved),
        )
        .route(
            "/api/v1/saved-messages/:id",
            get(saved::handle_get_saved)
                .put(saved::handle_update_saved)
                .delete(saved::handle_delete_saved),
        )
        .route("/api/v1/saved-messages/:id/load", post(saved::handle_load_saved))
        // Quotes
        .route("/api/v1/quotes/templates", get(quotes::handle_list_templates))
        .route(
            "/api/v1/quotes/templates/upload",
            post(quotes::handle_upload_template),
        )
        .route(
            "/api/v1/quotes/templates/create-clean",
            post(quotes::handle_create_clean_template),
        )
        .route(
            "/api/v1/quotes/templates/:id",
            get(quotes::handle_get_template)
                .put(quotes::handle_update_template)
                .delete(quotes::handle_delete_template),
        )
        .route(
            "/api/v1/quotes/templates/:id/upload",
            post(quotes::handle_replace_template_file),
        )
        .route(
            "/api/v1/quotes/templates/:id/preview",
            post(quotes::handle_preview_template),
        )
        .route("/api/v1/quotes/generate", post(quotes::handle_generate_quote))
        .route(
            "/api/v1/quotes/download/:quote_id",
            get(quotes::handle_download_quote),
        )
        .route("/api/v1/quotes/history", get(quotes::handle_quote_history))
        .route(
            "/api/v1/quotes/:id",
            axum::routing::delete(quotes::handle_delete_quote),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Same handlers for both lookup tables; the `Extension` selects the table.
fn catalog_routes(kind: CatalogKind) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(catalog::handlers::handle_list).post(catalog::handlers::handle_create),
        )
        .route(
            "/bulk",
            post(catalog::handlers::handle_bulk_create).delete(catalog::handlers::handle_bulk_delete),
        )
        .route(
            "/:id",
            put(catalog::handlers::handle_update).delete(catalog::handlers::handle_delete),
        )
        .layer(Extension(kind))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aws_sdk_s3::config::{BehaviorVersion, Region};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::quotes::render::DocxRenderer;
    use crate::storage::FileStore;

    /// Router over a lazy pool and an unconfigured S3 client. Only routes that
    /// never reach the database or storage can be exercised.
    fn test_app() -> Router {
        let config = Config {
            database_url: "postgres://localhost/mini_tools_test".to_string(),
            s3_bucket: "test-bucket".to_string(),
            s3_endpoint: "http://localhost:9000".to_string(),
            aws_access_key_id: "test".to_string(),
            aws_secret_access_key: "test".to_string(),
            pdf_converter_url: None,
            max_upload_bytes: 1024,
            port: 0,
            rust_log: "info".to_string(),
        };
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let s3 = aws_sdk_s3::Client::from_conf(
            aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new("us-east-1"))
                .build(),
        );

        build_router(AppState {
            db,
            files: FileStore::new(s3, config.s3_bucket.clone()),
            renderer: Arc::new(DocxRenderer::new(None)),
            config,
        })
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "mini-tools-api");
    }

    #[tokio::test]
    async fn test_message_preview_reports_unresolved() {
        let response = test_app()
            .oneshot(post_json(
                "/api/v1/message-templates/preview",
                json!({
                    "content": "Hi {{customerName}}, {{productName}} is ready",
                    "variables": { "customerName": "Minh" },
                    "fallback": "bracket"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Hi Minh, [Product Name] is ready");
        assert_eq!(body["unresolved"], json!(["productName"]));
    }

    #[tokio::test]
    async fn test_catalog_create_rejects_blank_name() {
        let response = test_app()
            .oneshot(post_json(
                "/api/v1/industries",
                json!({ "name": "   ", "label": "Blank" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_quote_template_update_rejects_duplicate_fields() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/v1/quotes/templates/00000000-0000-0000-0000-000000000000")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "name": "Quote",
                            "fields": [
                                { "name": "price", "label": "Price" },
                                { "name": "price", "label": "Price again" }
                            ]
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = test_app()
            .oneshot(Request::builder().uri("/api/v1/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
