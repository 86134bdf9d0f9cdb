//! System handlers: health, OpenAPI spec, progress event stream.

use crate::api::AppState;
use axum::{
    Json,
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/api/v1/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI 3.1 specification document")
    )
)]
pub async fn openapi_spec() -> Json<serde_json::Value> {
    use utoipa::OpenApi;

    match serde_json::to_value(crate::api::ApiDoc::openapi()) {
        Ok(spec) => Json(spec),
        Err(_) => Json(json!({ "error": "failed to serialize specification" })),
    }
}

/// GET /events - Server-sent events stream of progress updates
///
/// Every progress change for every upload is pushed here as it happens; the
/// SSE event type is the upload's status name, the payload the full
/// snapshot. Polling the uploads endpoint remains available for clients
/// that do not hold a stream open.
#[utoipa::path(
    get,
    path = "/api/v1/events",
    tag = "system",
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream")
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.ingestor.subscribe();
    let stream = BroadcastStream::new(receiver);

    let sse_stream = stream.filter_map(|result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json_data) => {
                let event_type = event.progress.status.as_str();
                Some(Ok(SseEvent::default().event(event_type).data(json_data)))
            }
            Err(e) => {
                tracing::warn!("failed to serialize progress event to JSON: {}", e);
                None
            }
        },
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!("SSE client lagged, skipped {} events", skipped);
            Some(Ok(SseEvent::default().event("error").data(format!(
                r#"{{"error":"lagged","skipped":{}}}"#,
                skipped
            ))))
        }
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
