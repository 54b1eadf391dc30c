//! HTTP handlers for the media pipeline operations.
//!
//! Thin validation-and-forward layer: each handler resolves parameters,
//! calls into `MediaService`, and serializes the engine's report. The
//! engines own all invariants.

use crate::{
    errors::AppError,
    models::media::MediaIndexRow,
    services::{
        MediaService,
        fetch::{SourceImage, decode_image_list},
        naming,
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Body for `POST /hotels/{external_id}/media/ingest`.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub images: Vec<SourceImage>,
}

/// Body for `POST /hotels/{external_id}/media/reorder`.
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ordered_public_paths: Vec<String>,
}

/// Query params for `POST /media/reconcile`.
#[derive(Debug, Deserialize)]
pub struct ReconcileQuery {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub slug: String,
    pub version: i64,
}

/// POST `/hotels/{external_id}/media/ingest` — bulk image migration.
pub async fn ingest(
    State(service): State<MediaService>,
    Path(external_id): Path<String>,
    Json(req): Json<IngestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let report = service.ingest(&external_id, req.images).await?;
    Ok(Json(report))
}

/// POST `/hotels/{external_id}/media/ingest-upstream` — same migration,
/// but the caller forwards the raw upstream API payload and the pipeline
/// decodes whichever of the known response shapes it matches.
pub async fn ingest_upstream(
    State(service): State<MediaService>,
    Path(external_id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let images = decode_image_list(&payload)?;
    let report = service.ingest(&external_id, images).await?;
    Ok(Json(report))
}

/// POST `/hotels/{external_id}/media/reorder` — sequence renumbering.
pub async fn reorder(
    State(service): State<MediaService>,
    Path(external_id): Path<String>,
    Json(req): Json<ReorderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = service
        .reorder(&external_id, req.ordered_public_paths)
        .await?;
    Ok(Json(outcome))
}

/// POST `/media/reconcile?dry_run=` — global index sweep.
pub async fn reconcile_all(
    State(service): State<MediaService>,
    Query(q): Query<ReconcileQuery>,
) -> Result<impl IntoResponse, AppError> {
    let report = service.reconcile_all(q.dry_run).await?;
    Ok(Json(report))
}

/// POST `/hotels/{external_id}/media/reconcile` — single-hotel rebuild.
pub async fn reconcile_one(
    State(service): State<MediaService>,
    Path(external_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let report = service.reconcile_one(&external_id).await?;
    Ok(Json(report))
}

/// POST `/hotels/{external_id}/media/folder-sync` — best-effort tier heal.
pub async fn folder_sync(
    State(service): State<MediaService>,
    Path(external_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let report = service.folder_sync(&external_id).await?;
    Ok(Json(report))
}

/// GET `/hotels/{external_id}/media` — current index rows, sequence order.
pub async fn list_media(
    State(service): State<MediaService>,
    Path(external_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // Resolve first so an unknown hotel is a 404, not an empty list.
    service.resolve_hotel(&external_id).await?;
    let rows = sqlx::query_as::<_, MediaIndexRow>(
        "SELECT id, external_id, file_name, file_path, storage_path, public_url, \
         file_type, file_size, slug, sequence, original_url, updated_at \
         FROM media_index WHERE external_id = ? \
         ORDER BY sequence IS NULL, sequence, file_name",
    )
    .bind(&external_id)
    .fetch_all(&*service.db)
    .await
    .map_err(crate::services::PipelineError::Sqlx)?;
    Ok(Json(rows))
}

/// GET `/hotels/{external_id}/version` — current cache-busting version.
pub async fn get_version(
    State(service): State<MediaService>,
    Path(external_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let hotel = service.resolve_hotel(&external_id).await?;
    let slug = naming::normalize_slug(&hotel.slug);
    let version = service.get_version(&slug).await?;
    Ok(Json(VersionResponse { slug, version }))
}

/// POST `/hotels/{external_id}/version` — bump after a media mutation.
pub async fn bump_version(
    State(service): State<MediaService>,
    Path(external_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let hotel = service.resolve_hotel(&external_id).await?;
    let slug = naming::normalize_slug(&hotel.slug);
    let version = service.bump_version(&slug, &external_id).await?;
    Ok(Json(VersionResponse { slug, version }))
}

/// GET `/media/public/{slug}/{file}` — serve one public-tier rendition.
pub async fn get_public_object(
    State(service): State<MediaService>,
    Path((slug, file)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let path = naming::public_path(&naming::normalize_slug(&slug), &file);
    let bytes = service
        .store
        .download(&path)
        .await?
        .ok_or_else(|| AppError::not_found(format!("object `{}` not found", path)))?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(naming::content_type_for(&file)),
    );
    Ok(response)
}
