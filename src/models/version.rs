//! Per-hotel media version counter record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Optimistic versioning counter used by clients to invalidate cached
/// image URLs after any media mutation.
///
/// The record (and the whole backing table) may legitimately not exist;
/// by convention absence means `version = 1`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct VersionRecord {
    /// Normalized hotel slug (primary key).
    pub slug: String,

    /// Hotel identifier in the upstream booking system.
    pub external_id: String,

    /// Monotonically non-decreasing counter.
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
