//! OpenAPI documentation and schema generation
//!
//! Defines the OpenAPI specification for the chapter-ingest REST API using
//! utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the chapter-ingest REST API
///
/// The spec can be accessed via:
/// - `/api/v1/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "chapter-ingest REST API",
        version = "0.3.0",
        description = "REST API for submitting chapter page archives, tracking upload progress, and serving committed pages",
        contact(
            name = "chapter-ingest",
            url = "https://github.com/chapter-ingest/chapter-ingest"
        ),
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6780", description = "Local development server")
    ),
    paths(
        // Chapters
        crate::api::routes::submit_chapter,
        crate::api::routes::get_chapter,
        crate::api::routes::delete_chapter,
        crate::api::routes::get_chapter_page,

        // Uploads
        crate::api::routes::get_upload_progress,
        crate::api::routes::cancel_upload,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(
        schemas(
            crate::types::UploadId,
            crate::types::ChapterId,
            crate::types::UploadStatus,
            crate::types::ChapterInfo,
            crate::progress::UploadProgress,
            crate::error::ApiError,
            crate::error::ErrorDetail,
        )
    ),
    tags(
        (name = "chapters", description = "Chapter submission, retrieval, and page serving"),
        (name = "uploads", description = "Upload progress and cancellation"),
        (name = "system", description = "Health, documentation, and event streaming")
    )
)]
pub struct ApiDoc;
