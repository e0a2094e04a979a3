//! Unified error types for the offline loader.
//!
//! Every variant renders with a stable upper-case code prefix so the
//! façade can relay it verbatim and operators can grep logs for it.

use std::path::PathBuf;

/// Unified error types for the capture pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., missing `url` field).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The requested URL cannot be parsed as an absolute URL, even after
    /// scheme normalization.
    #[error("MALFORMED_URL: {0}")]
    MalformedUrl(String),

    /// No renderer is compiled into this build.
    #[error("RENDER_DISABLED")]
    RenderDisabled,

    /// The page renderer failed to produce a document.
    #[error("RENDER_FAILED: {0}")]
    RenderFailed(String),

    /// The page renderer did not finish within the configured timeout.
    #[error("RENDER_TIMEOUT: render timeout after {0}ms")]
    RenderTimeout(u64),

    /// Rendered markup could not be rewritten.
    #[error("REWRITE_FAILED: {0}")]
    RewriteFailed(String),

    /// A snapshot could not be read back from storage.
    #[error("STORE_READ_ERROR: {}: {source}", path.display())]
    StoreRead { path: PathBuf, source: std::io::Error },

    /// A snapshot could not be persisted.
    #[error("STORE_WRITE_ERROR: {}: {source}", path.display())]
    StoreWrite { path: PathBuf, source: std::io::Error },
}

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::MalformedUrl(_) => "MALFORMED_URL",
            Error::RenderDisabled => "RENDER_DISABLED",
            Error::RenderFailed(_) => "RENDER_FAILED",
            Error::RenderTimeout(_) => "RENDER_TIMEOUT",
            Error::RewriteFailed(_) => "REWRITE_FAILED",
            Error::StoreRead { .. } => "STORE_READ_ERROR",
            Error::StoreWrite { .. } => "STORE_WRITE_ERROR",
        }
    }
}
