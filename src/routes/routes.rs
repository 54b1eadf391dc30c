//! Defines routes for the hotel media pipeline operations.
//!
//! ## Structure
//! - **Hotel-scoped endpoints** (external id resolved through the hotel
//!   directory before any I/O)
//!   - `POST /hotels/{external_id}/media/ingest`          — bulk image migration
//!   - `POST /hotels/{external_id}/media/ingest-upstream` — migration from a raw upstream payload
//!   - `POST /hotels/{external_id}/media/reorder`         — sequence renumbering
//!   - `POST /hotels/{external_id}/media/reconcile`       — replace-all index rebuild
//!   - `POST /hotels/{external_id}/media/folder-sync`     — best-effort tier heal
//!   - `GET  /hotels/{external_id}/media`                 — current index rows
//!   - `GET  /hotels/{external_id}/version`               — cache-busting version
//!   - `POST /hotels/{external_id}/version`               — bump after a mutation
//!
//! - **Global endpoints**
//!   - `POST /media/reconcile?dry_run=`       — full two-tier sweep
//!   - `GET  /media/public/{slug}/{file}`     — serve one public rendition

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        media_handlers::{
            bump_version, folder_sync, get_public_object, get_version, ingest, ingest_upstream,
            list_media, reconcile_all, reconcile_one, reorder,
        },
    },
    services::MediaService,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for all pipeline routes.
///
/// The router carries shared state (`MediaService`) to all handlers.
pub fn routes() -> Router<MediaService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // hotel-scoped media operations
        .route("/hotels/{external_id}/media", get(list_media))
        .route("/hotels/{external_id}/media/ingest", post(ingest))
        .route(
            "/hotels/{external_id}/media/ingest-upstream",
            post(ingest_upstream),
        )
        .route("/hotels/{external_id}/media/reorder", post(reorder))
        .route("/hotels/{external_id}/media/reconcile", post(reconcile_one))
        .route(
            "/hotels/{external_id}/media/folder-sync",
            post(folder_sync),
        )
        .route(
            "/hotels/{external_id}/version",
            get(get_version).post(bump_version),
        )
        // global operations
        .route("/media/reconcile", post(reconcile_all))
        .route("/media/public/{slug}/{file}", get(get_public_object))
}
