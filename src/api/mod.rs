//! REST API server module
//!
//! Provides an OpenAPI 3.1 compliant REST API for submitting chapter
//! archives, following upload progress, cancelling uploads, and serving
//! committed pages.
//!
//! Authorization, session handling, and rate limiting are owned by the
//! deployment's outer layers; this server exposes the core contract only.

use crate::{ChapterIngestor, Config, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Chapters
/// - `POST /api/v1/chapters` - Submit a chapter archive (multipart)
/// - `GET /api/v1/chapters/:id` - Get a committed chapter record
/// - `DELETE /api/v1/chapters/:id` - Delete a chapter (record and files)
/// - `GET /api/v1/chapters/:id/pages/:page` - Serve one page's bytes
///
/// ## Uploads
/// - `GET /api/v1/uploads/:id` - Poll upload progress
/// - `POST /api/v1/uploads/:id/cancel` - Cancel a running upload
///
/// ## System
/// - `GET /api/v1/health` - Health check
/// - `GET /api/v1/events` - Server-sent progress event stream
/// - `GET /api/v1/openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(ingestor: Arc<ChapterIngestor>, config: Arc<Config>) -> Router {
    let state = AppState::new(ingestor, config.clone());

    let api = Router::new()
        // Chapters
        .route("/chapters", post(routes::submit_chapter))
        .route("/chapters/:id", get(routes::get_chapter))
        .route("/chapters/:id", delete(routes::delete_chapter))
        .route("/chapters/:id/pages/:page", get(routes::get_chapter_page))
        // Uploads
        .route("/uploads/:id", get(routes::get_upload_progress))
        .route("/uploads/:id/cancel", post(routes::cancel_upload))
        // System
        .route("/health", get(routes::health_check))
        .route("/events", get(routes::event_stream))
        .route("/openapi.json", get(routes::openapi_spec));

    let router = Router::new().nest("/api/v1", api);

    // Merge Swagger UI routes if enabled (before applying state)
    let router = if config.api.enable_swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state);

    router.layer(build_cors_layer(&config.api.cors_origins))
}

/// Build a CORS layer from the configured origins ("*" or empty allows any)
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.is_empty() || origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Binds a TCP listener and serves the router until the server stops.
///
/// # Example
///
/// ```no_run
/// use chapter_ingest::{ChapterIngestor, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let ingestor = Arc::new(ChapterIngestor::new((*config).clone()).await?);
///
/// // Start API server (blocks until shutdown)
/// chapter_ingest::api::start_api_server(ingestor, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(
    ingestor: Arc<ChapterIngestor>,
    config: Arc<Config>,
) -> Result<()> {
    let bind_addr = config.api.bind_addr;

    tracing::info!(address = %bind_addr, "starting API server");

    let app = create_router(ingestor, config);

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_addr, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServer(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}
