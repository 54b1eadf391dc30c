//! Core data models for the hotel media pipeline.
//!
//! These entities mirror the metadata tables that shadow the two blob tiers.
//! They map cleanly to database tables via `sqlx::FromRow` and serialize
//! naturally as JSON via `serde`.

pub mod hotel;
pub mod media;
pub mod version;
