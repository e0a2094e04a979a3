//! Core types and shared functionality for the offline loader.
//!
//! This crate provides:
//! - Resource key derivation and the filesystem snapshot store
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{ResourceKey, SnapshotStore, derive_key};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
