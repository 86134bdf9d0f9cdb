//! Chapter submission, retrieval, deletion, and page serving handlers.

use crate::api::AppState;
use crate::db::ChapterStore;
use crate::error::{ApiError, Error};
use crate::ingest::UploadRequest;
use crate::types::ChapterId;
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// POST /chapters - Submit a chapter archive for ingestion
#[utoipa::path(
    post,
    path = "/api/v1/chapters",
    tag = "chapters",
    request_body(
        content = Vec<u8>,
        description = "multipart/form-data with fields: file (archive), collection_id, chapter_number, title (optional)",
        content_type = "multipart/form-data"
    ),
    responses(
        (status = 202, description = "Upload accepted; poll the returned upload id"),
        (status = 400, description = "Malformed metadata", body = crate::error::ApiError),
        (status = 409, description = "Duplicate chapter", body = crate::error::ApiError),
        (status = 422, description = "Unusable archive", body = crate::error::ApiError)
    )
)]
pub async fn submit_chapter(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut archive: Option<Vec<u8>> = None;
    let mut collection_id: Option<String> = None;
    let mut chapter_number: Option<String> = None;
    let mut title: Option<String> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => match field.bytes().await {
                Ok(bytes) => archive = Some(bytes.to_vec()),
                Err(e) => {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(ApiError::new(
                            "invalid_file",
                            format!("failed to read archive field: {}", e),
                        )),
                    )
                        .into_response();
                }
            },
            "collection_id" => {
                collection_id = field.text().await.ok();
            }
            "chapter_number" => {
                chapter_number = field.text().await.ok();
            }
            "title" => {
                title = field.text().await.ok();
            }
            _ => {}
        }
    }

    let Some(archive) = archive else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                "missing_file",
                "no archive provided in 'file' field",
            )),
        )
            .into_response();
    };

    let request = match UploadRequest::new(
        collection_id.unwrap_or_default(),
        chapter_number.unwrap_or_default(),
        title,
    ) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    match state.ingestor.submit(request, archive).await {
        Ok(upload_id) => (
            StatusCode::ACCEPTED,
            Json(json!({ "upload_id": upload_id })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /chapters/:id - Get a committed chapter record
#[utoipa::path(
    get,
    path = "/api/v1/chapters/{id}",
    tag = "chapters",
    params(
        ("id" = i64, Path, description = "Chapter id")
    ),
    responses(
        (status = 200, description = "Chapter record", body = crate::types::ChapterInfo),
        (status = 404, description = "Chapter not found", body = crate::error::ApiError)
    )
)]
pub async fn get_chapter(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.ingestor.db.get_chapter(ChapterId(id)).await {
        Ok(Some(chapter)) => match chapter.into_info() {
            Ok(info) => (StatusCode::OK, Json(info)).into_response(),
            Err(e) => e.into_response(),
        },
        Ok(None) => Error::NotFound(format!("chapter {}", id)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /chapters/:id - Delete a chapter record and its files
#[utoipa::path(
    delete,
    path = "/api/v1/chapters/{id}",
    tag = "chapters",
    params(
        ("id" = i64, Path, description = "Chapter id")
    ),
    responses(
        (status = 200, description = "Chapter deleted"),
        (status = 404, description = "Chapter not found", body = crate::error::ApiError)
    )
)]
pub async fn delete_chapter(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.ingestor.delete_chapter(ChapterId(id)).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "deleted": id }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /chapters/:id/pages/:page - Serve one page's raw bytes
///
/// Pages are 1-based. A page whose file content is missing is served as a
/// fixed placeholder image instead of an error, so one lost file does not
/// blank a reading session.
#[utoipa::path(
    get,
    path = "/api/v1/chapters/{id}/pages/{page}",
    tag = "chapters",
    params(
        ("id" = i64, Path, description = "Chapter id"),
        ("page" = u32, Path, description = "1-based page number")
    ),
    responses(
        (status = 200, description = "Raw image bytes", content_type = "image/*"),
        (status = 404, description = "Chapter or page number not found", body = crate::error::ApiError)
    )
)]
pub async fn get_chapter_page(
    State(state): State<AppState>,
    Path((id, page)): Path<(i64, u32)>,
) -> Response {
    let chapter = match state.ingestor.db.get_chapter(ChapterId(id)).await {
        Ok(Some(chapter)) => chapter,
        Ok(None) => return Error::NotFound(format!("chapter {}", id)).into_response(),
        Err(e) => return e.into_response(),
    };

    let pages = match chapter.page_list() {
        Ok(pages) => pages,
        Err(e) => return e.into_response(),
    };

    if page == 0 || page as usize > pages.len() {
        return Error::NotFound(format!("page {} of chapter {}", page, id)).into_response();
    }
    let reference = &pages[page as usize - 1];

    let content = state.ingestor.read_page(reference).await;
    let content_type = if content.placeholder {
        "image/png"
    } else {
        content_type_for(reference)
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        content.bytes,
    )
        .into_response()
}

/// MIME type for a page reference, by extension
fn content_type_for(reference: &str) -> &'static str {
    let extension = reference
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
