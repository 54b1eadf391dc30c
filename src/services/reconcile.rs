//! Rebuilding the metadata index from the raw storage listing.
//!
//! The index is a derived cache, never a source of truth. The global sweep
//! upserts rows in place; the single-hotel sweep deletes every row for the
//! hotel first and reinserts what storage actually holds (replace-all
//! semantics). Folder sync heals files present in only one of the tiers.

use crate::models::media::MediaIndexRow;
use crate::services::naming::{self, Tier, content_type_for, tier_dir};
use crate::services::object_store::ObjectInfo;
use crate::services::{MediaService, PipelineError, PipelineResult};
use chrono::Utc;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a global reconciliation sweep.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SweepReport {
    pub total_files: usize,
    pub records_processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<String>,
    /// First rows discovered, for dry-run inspection.
    pub sample: Vec<MediaIndexRow>,
}

/// Result of a single-hotel replace-all sweep.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct HotelSweepReport {
    pub created: usize,
    /// Inserted rows whose file name yielded a sequence number. A low
    /// ratio against `created` signals naming drift.
    pub seq_extracted: usize,
    pub seq_failed: usize,
}

/// Result of a best-effort tier heal.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FolderSyncReport {
    pub copied_to_public: usize,
    pub copied_to_originals: usize,
    pub errors: Vec<String>,
}

const DRY_RUN_SAMPLE: usize = 10;

impl MediaService {
    /// Sweep both tier roots end-to-end and upsert the index row of every
    /// parseable file, keyed by `(external_id, file_path)`.
    ///
    /// Processing is paged per slug subfolder so one oversized hotel cannot
    /// balloon memory, and writes run in bounded batches. Unparseable file
    /// names are counted in `errors` without stopping the sweep. With
    /// `dry_run` the sweep discovers and builds rows but issues zero writes.
    pub async fn reconcile_all(&self, dry_run: bool) -> PipelineResult<SweepReport> {
        let mut report = SweepReport::default();

        for tier in [Tier::Originals, Tier::Public] {
            let mut by_slug: BTreeMap<String, Vec<ObjectInfo>> = BTreeMap::new();
            for object in self.store.list(tier.root()).await? {
                if let Some(slug) = slug_of_path(&object.path) {
                    by_slug.entry(slug).or_default().push(object);
                }
            }

            for (slug, objects) in by_slug {
                report.total_files += objects.len();
                let mut rows = Vec::new();
                for object in objects {
                    match self.row_from_object(&slug, &object, None) {
                        Some(row) => rows.push(row),
                        None => report.errors.push(format!(
                            "unparseable file name: {}",
                            object.path
                        )),
                    }
                }

                report.records_processed += rows.len();
                if report.sample.len() < DRY_RUN_SAMPLE {
                    let take = DRY_RUN_SAMPLE - report.sample.len();
                    report.sample.extend(rows.iter().take(take).cloned());
                }
                if dry_run {
                    continue;
                }

                for batch in rows.chunks(self.reconcile_batch_size.max(1)) {
                    for row in batch {
                        if upsert_media_row(&self.db, row).await? {
                            report.inserted += 1;
                        } else {
                            report.updated += 1;
                        }
                    }
                }
            }
        }

        info!(
            dry_run,
            total = report.total_files,
            inserted = report.inserted,
            updated = report.updated,
            errors = report.errors.len(),
            "global reconciliation sweep finished"
        );
        Ok(report)
    }

    /// Rebuild the index for one hotel with replace-all semantics: delete
    /// every existing row, then reinsert exactly what storage holds.
    ///
    /// Lists the canonical layout plus the legacy `tier/hotels/slug` layout,
    /// de-duplicating by file name with the public tier winning conflicts.
    pub async fn reconcile_one(&self, external_id: &str) -> PipelineResult<HotelSweepReport> {
        let hotel = self.resolve_hotel(external_id).await?;
        let slug = naming::normalize_slug(&hotel.slug);

        sqlx::query("DELETE FROM media_index WHERE external_id = ?")
            .bind(external_id)
            .execute(&*self.db)
            .await?;

        // Originals first so a public rendition with the same file name
        // replaces it in the map.
        let mut by_name: BTreeMap<String, (String, ObjectInfo)> = BTreeMap::new();
        for tier in [Tier::Originals, Tier::Public] {
            for prefix in [
                tier_dir(tier, &slug),
                format!("{}/hotels/{}", tier.root(), slug),
            ] {
                for object in self.store.list(&prefix).await? {
                    let name = naming::file_name_of(&object.path).to_string();
                    by_name.insert(name, (slug.clone(), object));
                }
            }
        }

        let mut rows = Vec::new();
        let mut seq_extracted = 0;
        let mut seq_failed = 0;
        for (slug, object) in by_name.into_values() {
            let row = self
                .row_from_object(&slug, &object, Some(external_id))
                .unwrap_or_else(|| self.fallback_row(&slug, external_id, &object));
            if row.sequence.is_some() {
                seq_extracted += 1;
            } else {
                seq_failed += 1;
            }
            rows.push(row);
        }

        for batch in rows.chunks(self.reconcile_batch_size.max(1)) {
            insert_media_rows(&self.db, batch).await?;
        }

        let report = HotelSweepReport {
            created: rows.len(),
            seq_extracted,
            seq_failed,
        };
        info!(external_id, slug = %slug, ?report, "hotel index rebuilt");
        Ok(report)
    }

    /// Copy files present in exactly one tier into the other. Best-effort:
    /// per-file failures are accumulated, not fatal.
    pub async fn folder_sync(&self, external_id: &str) -> PipelineResult<FolderSyncReport> {
        let hotel = self.resolve_hotel(external_id).await?;
        let slug = naming::normalize_slug(&hotel.slug);

        let originals = self.tier_names(Tier::Originals, &slug).await?;
        let public = self.tier_names(Tier::Public, &slug).await?;
        let mut report = FolderSyncReport::default();

        for (name, from) in &originals {
            if !public.contains_key(name) {
                let to = naming::public_path(&slug, name);
                match self.copy_object(from, &to).await {
                    Ok(()) => report.copied_to_public += 1,
                    Err(err) => report.errors.push(format!("{}: {}", from, err)),
                }
            }
        }
        for (name, from) in &public {
            if !originals.contains_key(name) {
                let to = naming::original_path(&slug, name);
                match self.copy_object(from, &to).await {
                    Ok(()) => report.copied_to_originals += 1,
                    Err(err) => report.errors.push(format!("{}: {}", from, err)),
                }
            }
        }

        if !report.errors.is_empty() {
            warn!(
                external_id,
                errors = report.errors.len(),
                "folder sync finished with failures"
            );
        }
        Ok(report)
    }

    async fn tier_names(
        &self,
        tier: Tier,
        slug: &str,
    ) -> PipelineResult<BTreeMap<String, String>> {
        let mut names = BTreeMap::new();
        for object in self.store.list(&tier_dir(tier, slug)).await? {
            names.insert(
                naming::file_name_of(&object.path).to_string(),
                object.path,
            );
        }
        Ok(names)
    }

    async fn copy_object(&self, from: &str, to: &str) -> PipelineResult<()> {
        let bytes = self
            .store
            .download(from)
            .await?
            .ok_or_else(|| PipelineError::ObjectNotFound(from.to_string()))?;
        self.store
            .upload(to, bytes, Some(content_type_for(to)), true)
            .await
    }

    /// Build an index row for a stored object whose name parses under one
    /// of the known patterns. When `expected_id` is given, files naming a
    /// different hotel are treated as unparseable for this sweep.
    fn row_from_object(
        &self,
        slug: &str,
        object: &ObjectInfo,
        expected_id: Option<&str>,
    ) -> Option<MediaIndexRow> {
        let name = naming::file_name_of(&object.path);
        let parsed = naming::parse_media_filename(name)?;
        if let Some(expected) = expected_id {
            if parsed.external_id != expected {
                return None;
            }
        }
        Some(MediaIndexRow {
            id: Uuid::new_v4(),
            external_id: parsed.external_id,
            file_name: name.to_string(),
            file_path: object.path.clone(),
            storage_path: dir_of_path(&object.path),
            public_url: self.store.public_url(&object.path),
            file_type: object
                .content_type
                .clone()
                .unwrap_or_else(|| content_type_for(name).to_string()),
            file_size: object.size as i64,
            slug: slug.to_string(),
            sequence: parsed.sequence.map(i64::from),
            original_url: None,
            updated_at: Utc::now(),
        })
    }

    /// Single-hotel sweeps know which hotel a directory belongs to, so an
    /// unparseable name still gets a row — just without a sequence.
    fn fallback_row(&self, slug: &str, external_id: &str, object: &ObjectInfo) -> MediaIndexRow {
        let name = naming::file_name_of(&object.path);
        MediaIndexRow {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            file_name: name.to_string(),
            file_path: object.path.clone(),
            storage_path: dir_of_path(&object.path),
            public_url: self.store.public_url(&object.path),
            file_type: object
                .content_type
                .clone()
                .unwrap_or_else(|| content_type_for(name).to_string()),
            file_size: object.size as i64,
            slug: slug.to_string(),
            sequence: None,
            original_url: None,
            updated_at: Utc::now(),
        }
    }
}

fn slug_of_path(path: &str) -> Option<String> {
    let mut parts = path.split('/');
    let _tier = parts.next()?;
    let mut slug = parts.next()?;
    // Legacy layout nests the slug one level deeper: `tier/hotels/slug/...`.
    if slug == "hotels" {
        slug = parts.next()?;
    }
    // Require at least a file name below the slug directory.
    parts.next()?;
    Some(slug.to_string())
}

fn dir_of_path(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}

/// Upsert one index row keyed by `(external_id, file_path)`.
/// Returns true when a new row was inserted, false when updated in place.
pub(crate) async fn upsert_media_row(
    db: &sqlx::SqlitePool,
    row: &MediaIndexRow,
) -> PipelineResult<bool> {
    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM media_index WHERE external_id = ? AND file_path = ?")
            .bind(&row.external_id)
            .bind(&row.file_path)
            .fetch_optional(db)
            .await?;

    sqlx::query(
        r#"
        INSERT INTO media_index (
            id, external_id, file_name, file_path, storage_path, public_url,
            file_type, file_size, slug, sequence, original_url, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(external_id, file_path) DO UPDATE SET
            file_name = excluded.file_name,
            storage_path = excluded.storage_path,
            public_url = excluded.public_url,
            file_type = excluded.file_type,
            file_size = excluded.file_size,
            slug = excluded.slug,
            sequence = excluded.sequence,
            original_url = COALESCE(excluded.original_url, media_index.original_url),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(row.id)
    .bind(&row.external_id)
    .bind(&row.file_name)
    .bind(&row.file_path)
    .bind(&row.storage_path)
    .bind(&row.public_url)
    .bind(&row.file_type)
    .bind(row.file_size)
    .bind(&row.slug)
    .bind(row.sequence)
    .bind(&row.original_url)
    .bind(row.updated_at)
    .execute(db)
    .await?;

    Ok(existing.is_none())
}

/// Bulk-insert freshly built rows (replace-all sweep already cleared the
/// hotel's rows, so plain inserts suffice).
async fn insert_media_rows(db: &sqlx::SqlitePool, rows: &[MediaIndexRow]) -> PipelineResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut builder = QueryBuilder::<Sqlite>::new(
        "INSERT INTO media_index (id, external_id, file_name, file_path, storage_path, \
         public_url, file_type, file_size, slug, sequence, original_url, updated_at) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.id)
            .push_bind(&row.external_id)
            .push_bind(&row.file_name)
            .push_bind(&row.file_path)
            .push_bind(&row.storage_path)
            .push_bind(&row.public_url)
            .push_bind(&row.file_type)
            .push_bind(row.file_size)
            .push_bind(&row.slug)
            .push_bind(row.sequence)
            .push_bind(&row.original_url)
            .push_bind(row.updated_at);
    });
    builder.build().execute(db).await?;
    Ok(())
}
