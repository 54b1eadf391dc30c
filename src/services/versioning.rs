//! Per-hotel media version counter.
//!
//! Collaborators bump the counter after any media mutation so clients can
//! invalidate cached image URLs. The backing table is disposable: when it
//! is missing the counter degrades to a constant 1 instead of failing, and
//! the condition is logged once per process, not per call.

use crate::services::{MediaService, PipelineError, PipelineResult};
use chrono::Utc;
use std::sync::atomic::Ordering;
use tracing::warn;

const DEFAULT_VERSION: i64 = 1;

fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if db_err.message().to_ascii_lowercase().contains("no such table")
    )
}

impl MediaService {
    fn note_schema_absent(&self) {
        if !self.version_schema_absent.swap(true, Ordering::SeqCst) {
            warn!("hotel_versions table is missing; version counter degrades to constant 1");
        }
    }

    /// Current version for a hotel's media set. Absence of the record or
    /// of the whole table means version 1 by convention.
    pub async fn get_version(&self, slug: &str) -> PipelineResult<i64> {
        if self.version_schema_absent.load(Ordering::SeqCst) {
            return Ok(DEFAULT_VERSION);
        }
        let result: Result<Option<(i64,)>, sqlx::Error> =
            sqlx::query_as("SELECT version FROM hotel_versions WHERE slug = ?")
                .bind(slug)
                .fetch_optional(&*self.db)
                .await;
        match result {
            Ok(Some((version,))) => Ok(version),
            Ok(None) => Ok(DEFAULT_VERSION),
            Err(err) if is_missing_table(&err) => {
                self.note_schema_absent();
                Ok(DEFAULT_VERSION)
            }
            Err(err) => Err(PipelineError::Sqlx(err)),
        }
    }

    /// Increment and return the hotel's version. First bump over an absent
    /// record yields 2, keeping the "absent means 1" convention monotonic.
    /// A missing table makes this a no-op returning 1.
    pub async fn bump_version(&self, slug: &str, external_id: &str) -> PipelineResult<i64> {
        if self.version_schema_absent.load(Ordering::SeqCst) {
            return Ok(DEFAULT_VERSION);
        }
        let now = Utc::now();
        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO hotel_versions (slug, external_id, version, created_at, updated_at)
            VALUES (?, ?, 2, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                version = hotel_versions.version + 1,
                updated_at = excluded.updated_at
            RETURNING version
            "#,
        )
        .bind(slug)
        .bind(external_id)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await;

        match result {
            Ok((version,)) => Ok(version),
            Err(err) if is_missing_table(&err) => {
                self.note_schema_absent();
                Ok(DEFAULT_VERSION)
            }
            Err(err) => Err(PipelineError::Sqlx(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MediaService;
    use crate::services::object_store::LocalStore;
    use crate::services::testutil::{FakeSource, memory_db};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::{collections::HashMap, sync::Arc};

    async fn service(with_schema: bool) -> (tempfile::TempDir, MediaService) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::new(dir.path(), "https://media.example.com"));
        let db = if with_schema {
            memory_db().await
        } else {
            // Fresh database without any of the pipeline tables.
            Arc::new(
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect("sqlite::memory:")
                    .await
                    .unwrap(),
            )
        };
        let fetcher = Arc::new(FakeSource {
            images: HashMap::new(),
        });
        (dir, MediaService::new(db, store, fetcher))
    }

    #[tokio::test]
    async fn bump_is_monotonic_and_absent_record_reads_as_one() {
        let (_dir, service) = service(true).await;

        assert_eq!(service.get_version("aman-tokyo").await.unwrap(), 1);
        assert_eq!(service.bump_version("aman-tokyo", "12345").await.unwrap(), 2);
        assert_eq!(service.bump_version("aman-tokyo", "12345").await.unwrap(), 3);
        assert_eq!(service.get_version("aman-tokyo").await.unwrap(), 3);

        // Slugs are independent counters.
        assert_eq!(service.get_version("other-hotel").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_table_degrades_instead_of_erroring() {
        let (_dir, service) = service(false).await;

        assert_eq!(service.get_version("aman-tokyo").await.unwrap(), 1);
        assert_eq!(service.bump_version("aman-tokyo", "12345").await.unwrap(), 1);
        // Detected once; later calls short-circuit to the same answers.
        assert_eq!(service.get_version("aman-tokyo").await.unwrap(), 1);
    }
}
