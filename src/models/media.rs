//! Represents one stored media object as mirrored in the metadata index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One row of the media index: a metadata mirror of a single object in
/// either storage tier.
///
/// The index is a rebuildable cache over the blob store — the bytes on
/// the store are the source of truth, and reconciliation may delete and
/// recreate these rows wholesale at any time. Only the ingestion and
/// reconciliation engines write this table.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct MediaIndexRow {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Hotel identifier in the upstream booking system.
    pub external_id: String,

    /// Bare file name, e.g. `aman-tokyo_12345_01.jpg`.
    pub file_name: String,

    /// Full object path including tier and slug, e.g.
    /// `public/aman-tokyo/aman-tokyo_12345_01_1600w.webp`.
    /// Together with `external_id` this is the upsert key.
    pub file_path: String,

    /// Directory the object lives in, e.g. `public/aman-tokyo`.
    pub storage_path: String,

    /// Resolved public URL for the object.
    pub public_url: String,

    /// Content type (MIME type).
    pub file_type: String,

    /// Size in bytes.
    pub file_size: i64,

    /// Normalized hotel slug.
    pub slug: String,

    /// Sequence number parsed from the file name, if the name matched any
    /// known pattern that carries one.
    pub sequence: Option<i64>,

    /// Source URL the image was ingested from, when known. Not recoverable
    /// from storage, so reconciliation only preserves an existing value on
    /// upsert; nothing currently writes a fresh one.
    pub original_url: Option<String>,

    /// Timestamp of the last write to this row.
    pub updated_at: DateTime<Utc>,
}
