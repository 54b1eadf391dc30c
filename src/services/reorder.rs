//! Safe renumbering of a hotel's photo sequence.
//!
//! Sequences are merely permuted by a reorder, so a direct old→new rename
//! could overwrite an object another rename has not vacated yet. Every
//! affected object is therefore staged into a disjoint temporary namespace
//! first (phase 1) and only then renamed to its final sequence (phase 2).
//! Leftover temp objects from a crashed earlier run are swept before
//! phase 1 starts.

use crate::services::naming::{self, Tier, tier_dir};
use crate::services::object_store::move_object;
use crate::services::{MediaService, PipelineError, PipelineResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Result of one reorder run.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ReorderOutcome {
    /// False when the desired order already matched the stored one.
    pub changed: bool,
    /// Number of objects renamed across both tiers.
    pub count: usize,
}

/// Lifecycle of one renamed object within a single reorder run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RenameState {
    Planned,
    StagedToTemp,
    Finalized,
}

struct PlannedRename {
    from: String,
    staged: String,
    to: String,
    state: RenameState,
}

// Temp names look like `{original_name}.tmp{pid}{millis}`.
static TEMP_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.tmp\d+$").unwrap());

fn temp_tag() -> String {
    format!(
        "tmp{}{}",
        std::process::id(),
        chrono::Utc::now().timestamp_millis()
    )
}

fn is_temp_name(name: &str) -> bool {
    TEMP_SUFFIX.is_match(name)
}

impl MediaService {
    /// Renumber a hotel's photos so that position `i` of the given
    /// public-tier paths ends up with sequence `i + 1`, applied to both
    /// tiers.
    ///
    /// The input must be fully parseable, single-slug, and single-hotel,
    /// and must cover every live public photo of the hotel; anything mixed
    /// or partial is rejected before a single rename is made. A rename
    /// failure aborts the remaining plan and surfaces; a re-run recovers
    /// via the temp-object pre-clean.
    pub async fn reorder(
        &self,
        external_id: &str,
        ordered_public_paths: Vec<String>,
    ) -> PipelineResult<ReorderOutcome> {
        let hotel = self.resolve_hotel(external_id).await?;
        let slug = naming::normalize_slug(&hotel.slug);

        let mut seq_mapping = validate_and_plan(&slug, external_id, &ordered_public_paths)?;

        // A partial ordering would leave some live photo unvacated while
        // another one is renamed onto its sequence, overwriting it. Reject
        // any order that does not name every live public photo.
        for object in self.store.list(&tier_dir(Tier::Public, &slug)).await? {
            let name = naming::file_name_of(&object.path);
            let Some(parsed) = naming::parse_media_filename(name) else {
                continue;
            };
            if parsed.external_id != external_id {
                continue;
            }
            if let Some(seq) = parsed.sequence {
                if !seq_mapping.contains_key(&seq) {
                    return Err(PipelineError::Validation(format!(
                        "live photo with sequence {} is missing from the desired order",
                        seq
                    )));
                }
            }
        }

        seq_mapping.retain(|old, new| *old != *new);
        if seq_mapping.is_empty() {
            debug!(external_id, "photo order already matches, nothing to rename");
            return Ok(ReorderOutcome {
                changed: false,
                count: 0,
            });
        }
        info!(
            external_id,
            slug = %slug,
            moves = seq_mapping.len(),
            "reordering photo sequence"
        );

        self.sweep_leftover_temps(&slug).await?;

        let tag = temp_tag();
        let mut plan = Vec::new();
        for tier in [Tier::Originals, Tier::Public] {
            for object in self.store.list(&tier_dir(tier, &slug)).await? {
                let name = naming::file_name_of(&object.path);
                let Some(parsed) = naming::parse_media_filename(name) else {
                    continue;
                };
                if parsed.external_id != external_id {
                    continue;
                }
                let Some(old_seq) = parsed.sequence else {
                    continue;
                };
                let Some(&new_seq) = seq_mapping.get(&old_seq) else {
                    continue;
                };
                let to = object.path.replace(
                    &format!("_{}_{}", external_id, naming::sequence_label(old_seq)),
                    &format!("_{}_{}", external_id, naming::sequence_label(new_seq)),
                );
                plan.push(PlannedRename {
                    staged: format!("{}.{}", object.path, tag),
                    from: object.path,
                    to,
                    state: RenameState::Planned,
                });
            }
        }

        // Phase 1: vacate every old name into the temp namespace.
        for entry in plan.iter_mut() {
            move_object(&*self.store, &entry.from, &entry.staged).await?;
            entry.state = RenameState::StagedToTemp;
        }

        // Phase 2: land every staged object on its final sequence. No
        // object enters this phase before its own phase 1 completed.
        for entry in plan.iter_mut() {
            debug_assert_eq!(entry.state, RenameState::StagedToTemp);
            move_object(&*self.store, &entry.staged, &entry.to).await?;
            entry.state = RenameState::Finalized;
        }

        Ok(ReorderOutcome {
            changed: true,
            count: plan.len(),
        })
    }

    /// Delete temp-tagged objects a crashed earlier run left behind.
    async fn sweep_leftover_temps(&self, slug: &str) -> PipelineResult<()> {
        let mut leftovers = Vec::new();
        for tier in [Tier::Originals, Tier::Public] {
            for object in self.store.list(&tier_dir(tier, slug)).await? {
                if is_temp_name(naming::file_name_of(&object.path)) {
                    leftovers.push(object.path);
                }
            }
        }
        if !leftovers.is_empty() {
            warn!(
                slug = %slug,
                count = leftovers.len(),
                "removing temp objects from an interrupted reorder"
            );
            self.store.remove(&leftovers).await?;
        }
        Ok(())
    }
}

/// Validate the caller-supplied order and compute the `old → new` sequence
/// mapping, identity entries included so the caller can check the order
/// against the live photo set.
fn validate_and_plan(
    slug: &str,
    external_id: &str,
    ordered_public_paths: &[String],
) -> PipelineResult<HashMap<u32, u32>> {
    if ordered_public_paths.is_empty() {
        return Err(PipelineError::Validation(
            "no photo paths supplied".to_string(),
        ));
    }

    let prefix = format!("{}/", tier_dir(Tier::Public, slug));
    let mut mapping = HashMap::new();

    for (i, path) in ordered_public_paths.iter().enumerate() {
        if !path.starts_with(&prefix) {
            return Err(PipelineError::Validation(format!(
                "path `{}` is not under the public tier for `{}`",
                path, slug
            )));
        }
        let name = naming::file_name_of(path);
        let parsed = naming::parse_media_filename(name).ok_or_else(|| {
            PipelineError::Validation(format!("file name `{}` matches no known pattern", name))
        })?;
        if parsed.external_id != external_id {
            return Err(PipelineError::Validation(format!(
                "path `{}` belongs to hotel `{}`, not `{}`",
                path, parsed.external_id, external_id
            )));
        }
        let old_seq = parsed.sequence.ok_or_else(|| {
            PipelineError::Validation(format!("file name `{}` carries no sequence", name))
        })?;

        let new_seq = i as u32 + 1;
        if mapping.insert(old_seq, new_seq).is_some() {
            return Err(PipelineError::Validation(format!(
                "sequence {} appears more than once in the desired order",
                old_seq
            )));
        }
    }

    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testutil::{seed_hotel, service_with_images};
    use bytes::Bytes;
    use std::collections::{HashMap as Map, HashSet};

    async fn seed_photos(service: &crate::services::MediaService, n: u32) {
        for seq in 1..=n {
            let original = naming::original_path(
                "aman-tokyo",
                &naming::original_filename("aman-tokyo", "12345", seq, "jpg"),
            );
            let public = naming::public_path(
                "aman-tokyo",
                &naming::public_filename("aman-tokyo", "12345", seq, 1600, "webp"),
            );
            let body = Bytes::from(format!("image-{}", seq));
            service
                .store
                .upload(&original, body.clone(), None, true)
                .await
                .unwrap();
            service.store.upload(&public, body, None, true).await.unwrap();
        }
    }

    fn public(seq: u32) -> String {
        naming::public_path(
            "aman-tokyo",
            &naming::public_filename("aman-tokyo", "12345", seq, 1600, "webp"),
        )
    }

    #[tokio::test]
    async fn permutes_sequences_across_both_tiers() {
        let (_dir, service) = service_with_images(Map::new()).await;
        seed_hotel(&service.db, "12345", "aman-tokyo").await;
        seed_photos(&service, 3).await;

        // Desired order: the image formerly at 03 becomes 01.
        let outcome = service
            .reorder("12345", vec![public(3), public(1), public(2)])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReorderOutcome {
                changed: true,
                count: 6
            }
        );

        // Content moved with the rename: new 01 carries old 03's bytes.
        let new01 = service.store.download(&public(1)).await.unwrap().unwrap();
        assert_eq!(new01, Bytes::from("image-3"));
        let new02 = service.store.download(&public(2)).await.unwrap().unwrap();
        assert_eq!(new02, Bytes::from("image-1"));

        // Sequence uniqueness: every live public object holds a distinct
        // sequence, and the multiset of payloads is unchanged.
        let listed = service.store.list("public/aman-tokyo").await.unwrap();
        let mut seqs = HashSet::new();
        let mut bodies = HashSet::new();
        for object in &listed {
            let parsed =
                naming::parse_media_filename(naming::file_name_of(&object.path)).unwrap();
            assert!(seqs.insert(parsed.sequence.unwrap()));
            bodies.insert(
                service
                    .store
                    .download(&object.path)
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }
        assert_eq!(listed.len(), 3);
        assert_eq!(
            bodies,
            HashSet::from([
                Bytes::from("image-1"),
                Bytes::from("image-2"),
                Bytes::from("image-3")
            ])
        );

        // Originals tier was renumbered in lockstep.
        let original01 = naming::original_path(
            "aman-tokyo",
            &naming::original_filename("aman-tokyo", "12345", 1, "jpg"),
        );
        assert_eq!(
            service.store.download(&original01).await.unwrap().unwrap(),
            Bytes::from("image-3")
        );
    }

    #[tokio::test]
    async fn noop_when_order_already_matches() {
        let (_dir, service) = service_with_images(Map::new()).await;
        seed_hotel(&service.db, "12345", "aman-tokyo").await;
        seed_photos(&service, 2).await;

        let outcome = service
            .reorder("12345", vec![public(1), public(2)])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReorderOutcome {
                changed: false,
                count: 0
            }
        );
    }

    #[tokio::test]
    async fn partial_order_is_rejected_before_any_rename() {
        let (_dir, service) = service_with_images(Map::new()).await;
        seed_hotel(&service.db, "12345", "aman-tokyo").await;
        seed_photos(&service, 3).await;

        // Photo 02 is live but absent from the desired order; accepting
        // this would rename old-01 onto it and destroy its payload.
        let err = service
            .reorder("12345", vec![public(3), public(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));

        // Nothing was renamed: all three photos still hold their bytes.
        let listed = service.store.list("public/aman-tokyo").await.unwrap();
        assert_eq!(listed.len(), 3);
        for seq in 1..=3u32 {
            assert_eq!(
                service.store.download(&public(seq)).await.unwrap().unwrap(),
                Bytes::from(format!("image-{}", seq))
            );
        }
    }

    #[tokio::test]
    async fn mixed_hotels_are_a_hard_error() {
        let (_dir, service) = service_with_images(Map::new()).await;
        seed_hotel(&service.db, "12345", "aman-tokyo").await;
        seed_photos(&service, 1).await;

        let foreign =
            "public/aman-tokyo/aman-tokyo_99999_02_1600w.webp".to_string();
        let err = service
            .reorder("12345", vec![public(1), foreign])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn paths_outside_public_tier_are_rejected() {
        let (_dir, service) = service_with_images(Map::new()).await;
        seed_hotel(&service.db, "12345", "aman-tokyo").await;

        let original = "originals/aman-tokyo/aman-tokyo_12345_01.jpg".to_string();
        let err = service.reorder("12345", vec![original]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));

        let err = service.reorder("12345", vec![]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn leftover_temp_objects_are_swept_before_renaming() {
        let (_dir, service) = service_with_images(Map::new()).await;
        seed_hotel(&service.db, "12345", "aman-tokyo").await;
        seed_photos(&service, 2).await;

        // Simulate a crashed earlier run that staged but never finalized.
        let stale = format!("{}.tmp4219900000000", public(2));
        service
            .store
            .upload(&stale, Bytes::from("stale"), None, true)
            .await
            .unwrap();

        service
            .reorder("12345", vec![public(2), public(1)])
            .await
            .unwrap();

        assert!(service.store.download(&stale).await.unwrap().is_none());
        let listed = service.store.list("public/aman-tokyo").await.unwrap();
        assert!(
            listed
                .iter()
                .all(|o| !is_temp_name(naming::file_name_of(&o.path)))
        );
    }
}
