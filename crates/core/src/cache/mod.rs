//! Filesystem-backed capture cache.
//!
//! This module provides the two halves of cache addressing:
//!
//! - Deterministic key derivation from a URL (`key`)
//! - Write-once snapshot persistence under a storage root (`store`)

pub mod key;
pub mod store;

pub use crate::Error;

pub use key::{ResourceKey, derive_key, sanitize_component};
pub use store::SnapshotStore;
