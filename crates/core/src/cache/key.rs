//! Resource key derivation.
//!
//! Maps a normalized URL to the `(host, path)` pair that addresses its
//! snapshot on disk. Distinct URLs that sanitize identically share a key.

use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::Error;

/// File name of the snapshot inside each key directory.
pub const SNAPSHOT_FILE: &str = "index.html";

/// Identity of a cached page: sanitized host and sanitized path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    host: String,
    path: String,
}

impl ResourceKey {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Location of the snapshot relative to the storage root.
    pub fn relative_path(&self) -> PathBuf {
        [self.host.as_str(), self.path.as_str(), SNAPSHOT_FILE].iter().collect()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.path)
    }
}

/// Replace every character outside `[a-zA-Z0-9]` with `_`.
pub fn sanitize_component(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Derive the resource key for an absolute URL.
///
/// The query string and fragment do not participate in the key.
///
/// # Errors
///
/// Returns `Error::MalformedUrl` if the URL has no host.
pub fn derive_key(url: &Url) -> Result<ResourceKey, Error> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::MalformedUrl(format!("missing host: {url}")))?;

    Ok(ResourceKey { host: sanitize_component(host), path: sanitize_component(url.path()) })
}
