//! Media pipeline engines and the shared service state they hang off.

pub mod fetch;
pub mod ingest;
pub mod naming;
pub mod object_store;
pub mod reconcile;
pub mod reorder;
pub mod versioning;

use crate::models::hotel::Hotel;
use crate::services::fetch::SourceFetch;
use crate::services::object_store::ObjectStore;
use sqlx::SqlitePool;
use std::{
    io,
    sync::{Arc, atomic::AtomicBool},
};
use thiserror::Error;

/// Error taxonomy shared by every engine.
///
/// `Validation` and `HotelNotFound` are rejected before any I/O happens;
/// `Fetch` only ever surfaces at per-item granularity inside a batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("hotel `{0}` not found")]
    HotelNotFound(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("backing store has no native rename")]
    RenameUnsupported,
    #[error("upstream response matched no known shape")]
    UnparseableResponse,
    #[error("fetching `{url}` failed: {reason}")]
    Fetch { url: String, reason: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Shared state for all pipeline operations: the metadata database, the
/// blob store capability, and the source-image fetcher.
///
/// Engines are request-scoped; this struct carries no per-run state and is
/// cheap to clone into axum handlers.
#[derive(Clone)]
pub struct MediaService {
    /// Metadata index + version counter + hotel directory.
    pub db: Arc<SqlitePool>,

    /// Two-tier blob store.
    pub store: Arc<dyn ObjectStore>,

    /// Downloader for externally hosted source images.
    pub fetcher: Arc<dyn SourceFetch>,

    /// How many images are in flight at once during ingestion.
    pub ingest_batch_size: usize,

    /// How many index writes are in flight at once during reconciliation.
    pub reconcile_batch_size: usize,

    /// Latched once the version-counter table is found missing; from then
    /// on the counter degrades to a constant without touching the database.
    pub(crate) version_schema_absent: Arc<AtomicBool>,
}

impl MediaService {
    pub fn new(
        db: Arc<SqlitePool>,
        store: Arc<dyn ObjectStore>,
        fetcher: Arc<dyn SourceFetch>,
    ) -> Self {
        Self {
            db,
            store,
            fetcher,
            ingest_batch_size: 10,
            reconcile_batch_size: 50,
            version_schema_absent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Look up a hotel in the read-only directory table.
    ///
    /// Every collaborator-facing operation resolves the hotel first so the
    /// slug used for path computation always comes from one place.
    pub async fn resolve_hotel(&self, external_id: &str) -> PipelineResult<Hotel> {
        sqlx::query_as::<_, Hotel>(
            "SELECT external_id, slug, name FROM hotels WHERE external_id = ?",
        )
        .bind(external_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => PipelineError::HotelNotFound(external_id.to_string()),
            other => PipelineError::Sqlx(other),
        })
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::services::fetch::SourceFetch;
    use crate::services::object_store::LocalStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::HashMap;

    /// In-memory source-image host keyed by URL; unlisted URLs fail the
    /// same way a dead link would.
    pub struct FakeSource {
        pub images: HashMap<String, Bytes>,
    }

    #[async_trait]
    impl SourceFetch for FakeSource {
        async fn fetch_bytes(&self, url: &str) -> PipelineResult<Bytes> {
            self.images
                .get(url)
                .cloned()
                .ok_or_else(|| PipelineError::Fetch {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                })
        }
    }

    pub async fn memory_db() -> Arc<SqlitePool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        for stmt in crate::sql_statements(include_str!("../../migrations/0001_init.sql")) {
            sqlx::query(&stmt).execute(&pool).await.unwrap();
        }
        Arc::new(pool)
    }

    pub async fn seed_hotel(db: &SqlitePool, external_id: &str, slug: &str) {
        sqlx::query("INSERT INTO hotels (external_id, slug, name) VALUES (?, ?, ?)")
            .bind(external_id)
            .bind(slug)
            .bind(slug)
            .execute(db)
            .await
            .unwrap();
    }

    /// Service over a temp-dir store, an in-memory database, and the
    /// provided fake source images.
    pub async fn service_with_images(
        images: HashMap<String, Bytes>,
    ) -> (tempfile::TempDir, MediaService) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::new(dir.path(), "https://media.example.com"));
        let db = memory_db().await;
        let service = MediaService::new(db, store, Arc::new(FakeSource { images }));
        (dir, service)
    }
}
