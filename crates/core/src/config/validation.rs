//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `render_timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `network_idle_ms` is 0 or not shorter than the render timeout
    /// - `storage_root` is empty
    /// - either viewport dimension is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render_timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "render_timeout_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.render_timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "render_timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.network_idle_ms == 0 {
            return Err(ConfigError::Invalid { field: "network_idle_ms".into(), reason: "must be greater than 0".into() });
        }
        if self.network_idle_ms >= self.render_timeout_ms {
            return Err(ConfigError::Invalid {
                field: "network_idle_ms".into(),
                reason: "must be shorter than render_timeout_ms".into(),
            });
        }

        if self.storage_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid { field: "storage_root".into(), reason: "must not be empty".into() });
        }

        if self.viewport.0 == 0 || self.viewport.1 == 0 {
            return Err(ConfigError::Invalid { field: "viewport".into(), reason: "dimensions must be non-zero".into() });
        }

        if !self.bypass_csp {
            tracing::warn!("bypass_csp is disabled; pages with strict CSP may not render their inline scripts");
        }

        Ok(())
    }
}
