//! Bulk ingestion of externally hosted images into the two storage tiers.
//!
//! Each image is fetched from its source URL, written to the originals
//! tier, and mirrored as a public rendition. Items are independent: a dead
//! link fails that item only, and upload is skipped when the stored
//! original already matches the source by byte size.

use crate::services::fetch::SourceImage;
use crate::services::naming::{self, PUBLIC_FORMAT, PUBLIC_WIDTH, content_type_for};
use crate::services::{MediaService, PipelineResult};
use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Aggregate counters for one ingestion run. Every input image lands in
/// exactly one of succeeded/failed/skipped, and `total` always equals the
/// input length.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct IngestStatistics {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// One processed image, whether freshly uploaded or skipped as already
/// migrated.
#[derive(Clone, Debug, Serialize)]
pub struct MigratedImage {
    pub file_name: String,
    pub original_path: String,
    pub public_path: String,
    pub public_url: String,
    pub sequence: u32,
    pub source_url: String,
    pub skipped: bool,
}

/// Result of one ingestion run.
#[derive(Clone, Debug, Serialize)]
pub struct IngestReport {
    pub migrated_images: Vec<MigratedImage>,
    pub statistics: IngestStatistics,
    /// One human-readable entry per failed item.
    pub errors: Vec<String>,
}

enum ItemOutcome {
    Migrated(MigratedImage),
    Skipped(MigratedImage),
    Failed(String),
}

impl MediaService {
    /// Ingest a batch of source images for one hotel.
    ///
    /// Sequence numbers continue after the highest sequence recorded in the
    /// metadata index and are assigned by input position, so a failed item
    /// still consumes its slot. Re-running the same batch before the index
    /// has been reconciled re-derives the same paths and skips every image
    /// whose stored original matches the source by byte size.
    ///
    /// Images are processed in bounded batches; within a batch they run
    /// concurrently and one item's failure never cancels its siblings.
    pub async fn ingest(
        &self,
        external_id: &str,
        images: Vec<SourceImage>,
    ) -> PipelineResult<IngestReport> {
        let hotel = self.resolve_hotel(external_id).await?;
        let slug = naming::normalize_slug(&hotel.slug);
        let start_seq = self.next_sequence(external_id).await?;
        info!(
            external_id,
            slug = %slug,
            count = images.len(),
            start_seq,
            "starting media ingestion"
        );

        let mut migrated_images = Vec::new();
        let mut statistics = IngestStatistics {
            total: images.len(),
            ..Default::default()
        };
        let mut errors = Vec::new();

        let items: Vec<(u32, SourceImage)> = images
            .into_iter()
            .enumerate()
            .map(|(i, image)| (start_seq + i as u32, image))
            .collect();

        for batch in items.chunks(self.ingest_batch_size.max(1)) {
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|(seq, image)| self.ingest_one(&slug, external_id, *seq, image)),
            )
            .await;

            for outcome in outcomes {
                match outcome {
                    ItemOutcome::Migrated(image) => {
                        statistics.succeeded += 1;
                        migrated_images.push(image);
                    }
                    ItemOutcome::Skipped(image) => {
                        statistics.skipped += 1;
                        migrated_images.push(image);
                    }
                    ItemOutcome::Failed(message) => {
                        statistics.failed += 1;
                        errors.push(message);
                    }
                }
            }
        }

        info!(external_id, ?statistics, "media ingestion finished");
        Ok(IngestReport {
            migrated_images,
            statistics,
            errors,
        })
    }

    /// Highest sequence the metadata index records for the hotel, plus one.
    ///
    /// The index is rebuilt by reconciliation, not by ingestion, so a
    /// re-run ahead of the next reconcile sweep lands on the same numbers
    /// and the byte-size skip can recognize already-migrated images.
    async fn next_sequence(&self, external_id: &str) -> PipelineResult<u32> {
        let max: (Option<i64>,) =
            sqlx::query_as("SELECT MAX(sequence) FROM media_index WHERE external_id = ?")
                .bind(external_id)
                .fetch_one(&*self.db)
                .await?;
        Ok(max.0.unwrap_or(0).max(0) as u32 + 1)
    }

    async fn ingest_one(
        &self,
        slug: &str,
        external_id: &str,
        seq: u32,
        image: &SourceImage,
    ) -> ItemOutcome {
        match self.try_ingest_one(slug, external_id, seq, image).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(url = %image.url, seq, "image ingestion failed: {}", err);
                ItemOutcome::Failed(format!("{}: {}", image.url, err))
            }
        }
    }

    async fn try_ingest_one(
        &self,
        slug: &str,
        external_id: &str,
        seq: u32,
        image: &SourceImage,
    ) -> PipelineResult<ItemOutcome> {
        let ext = naming::extension_of(&image.url);
        let original_name = naming::original_filename(slug, external_id, seq, &ext);
        let original_path = naming::original_path(slug, &original_name);
        let public_name =
            naming::public_filename(slug, external_id, seq, PUBLIC_WIDTH, PUBLIC_FORMAT);
        let public_path = naming::public_path(slug, &public_name);

        let fetched = self.fetcher.fetch_bytes(&image.url).await?;

        let migrated = MigratedImage {
            file_name: original_name,
            original_path: original_path.clone(),
            public_path: public_path.clone(),
            public_url: self.store.public_url(&public_path),
            sequence: seq,
            source_url: image.url.clone(),
            skipped: false,
        };

        // Byte-size equality is the only change-detection signal here; a
        // matching size means the image was migrated by an earlier run.
        if let Some(existing) = self.store.download(&original_path).await? {
            if existing.len() == fetched.len() {
                debug!(path = %original_path, "already migrated, skipping upload");
                return Ok(ItemOutcome::Skipped(MigratedImage {
                    skipped: true,
                    ..migrated
                }));
            }
        }

        self.store
            .upload(
                &original_path,
                fetched.clone(),
                Some(content_type_for(&original_path)),
                true,
            )
            .await?;

        // The public rendition is best-effort: the original landing is what
        // makes the item migrated.
        if let Err(err) = self
            .store
            .upload(
                &public_path,
                derive_public_rendition(&fetched),
                Some(content_type_for(&public_path)),
                true,
            )
            .await
        {
            warn!(path = %public_path, "public rendition upload failed: {}", err);
        }

        Ok(ItemOutcome::Migrated(migrated))
    }
}

/// Derive the web-optimized public rendition from original bytes.
///
/// Pass-through: the public tier carries the original payload under the
/// rendition name.
fn derive_public_rendition(original: &Bytes) -> Bytes {
    original.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::PipelineError;
    use crate::services::testutil::{seed_hotel, service_with_images};
    use std::collections::HashMap;

    fn three_images() -> HashMap<String, Bytes> {
        HashMap::from([
            (
                "https://img.example.com/pool.jpg".to_string(),
                Bytes::from(vec![1u8; 100]),
            ),
            (
                "https://img.example.com/lobby.jpg".to_string(),
                Bytes::from(vec![2u8; 200]),
            ),
            (
                "https://img.example.com/suite.jpg".to_string(),
                Bytes::from(vec![3u8; 300]),
            ),
        ])
    }

    fn sources() -> Vec<SourceImage> {
        ["pool", "lobby", "suite"]
            .iter()
            .map(|name| SourceImage {
                url: format!("https://img.example.com/{}.jpg", name),
                source_label: Some(name.to_string()),
            })
            .collect()
    }

    #[tokio::test]
    async fn ingests_three_images_with_contiguous_sequences() {
        let (_dir, service) = service_with_images(three_images()).await;
        seed_hotel(&service.db, "12345", "aman-tokyo").await;

        let report = service.ingest("12345", sources()).await.unwrap();
        assert_eq!(
            report.statistics,
            IngestStatistics {
                total: 3,
                succeeded: 3,
                failed: 0,
                skipped: 0
            }
        );
        assert!(report.errors.is_empty());

        for seq in 1..=3u32 {
            let original = format!("originals/aman-tokyo/aman-tokyo_12345_{:02}.jpg", seq);
            let public = format!("public/aman-tokyo/aman-tokyo_12345_{:02}_1600w.webp", seq);
            assert!(service.store.download(&original).await.unwrap().is_some());
            assert!(service.store.download(&public).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn second_run_skips_everything_by_byte_size() {
        let (_dir, service) = service_with_images(three_images()).await;
        seed_hotel(&service.db, "12345", "aman-tokyo").await;

        let first = service.ingest("12345", sources()).await.unwrap();
        assert_eq!(first.statistics.succeeded, 3);

        let second = service.ingest("12345", sources()).await.unwrap();
        assert_eq!(second.statistics.skipped, second.statistics.total);
        assert_eq!(second.statistics.succeeded, 0);
        assert!(second.migrated_images.iter().all(|m| m.skipped));
    }

    #[tokio::test]
    async fn sequences_continue_after_indexed_ones() {
        let (_dir, service) = service_with_images(three_images()).await;
        seed_hotel(&service.db, "12345", "aman-tokyo").await;

        // Reconciled index already records sequences up to 5.
        sqlx::query(
            "INSERT INTO media_index (id, external_id, file_name, file_path, storage_path, \
             public_url, file_type, file_size, slug, sequence, original_url, updated_at) \
             VALUES (?, '12345', 'aman-tokyo_12345_05.jpg', \
             'originals/aman-tokyo/aman-tokyo_12345_05.jpg', 'originals/aman-tokyo', 'u', \
             'image/jpeg', 10, 'aman-tokyo', 5, NULL, datetime('now'))",
        )
        .bind(uuid::Uuid::new_v4())
        .execute(&*service.db)
        .await
        .unwrap();

        let report = service.ingest("12345", sources()).await.unwrap();
        let seqs: Vec<u32> = report.migrated_images.iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![6, 7, 8]);
    }

    #[tokio::test]
    async fn one_dead_link_fails_only_its_item() {
        let mut images = three_images();
        images.remove("https://img.example.com/lobby.jpg");
        let (_dir, service) = service_with_images(images).await;
        seed_hotel(&service.db, "12345", "aman-tokyo").await;

        let report = service.ingest("12345", sources()).await.unwrap();
        assert_eq!(report.statistics.total, 3);
        assert_eq!(report.statistics.succeeded, 2);
        assert_eq!(report.statistics.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("lobby.jpg"));

        // The failed item consumed its sequence slot: survivors are 01 and 03.
        let seqs: Vec<u32> = report.migrated_images.iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![1, 3]);
    }

    #[tokio::test]
    async fn unknown_hotel_is_rejected_before_io() {
        let (_dir, service) = service_with_images(HashMap::new()).await;
        let err = service.ingest("99999", sources()).await.unwrap_err();
        assert!(matches!(err, PipelineError::HotelNotFound(_)));
    }
}
