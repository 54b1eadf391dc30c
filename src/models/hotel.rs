//! Read-only hotel directory record.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A hotel as known to the upstream booking system.
///
/// The pipeline only ever reads this table; it is owned by the admin
/// application. The `external_id` is opaque here and the `slug` is the
/// normalized directory key under which media is stored.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Hotel {
    /// Identifier assigned by the upstream booking system.
    pub external_id: String,

    /// Normalized directory key (see `naming::normalize_slug`).
    pub slug: String,

    /// Display name, carried along for logging only.
    pub name: String,
}
