//! Filesystem snapshot store.
//!
//! Snapshots live at `root/<host>/<path>/index.html`. Presence is decided
//! purely by the file existing; there is no manifest or sidecar.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::key::ResourceKey;
use crate::Error;

/// Write-once store of rendered HTML documents keyed by [`ResourceKey`].
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Create a store rooted at `root` without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a store and make sure its root directory exists.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let store = Self::new(root);
        tokio::fs::create_dir_all(&store.root)
            .await
            .map_err(|source| Error::StoreWrite { path: store.root.clone(), source })?;
        tracing::info!(root = %store.root.display(), "snapshot store ready");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of the snapshot for `key`.
    pub fn path_for(&self, key: &ResourceKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Whether a snapshot file is present for `key`.
    ///
    /// A missing directory anywhere along the path simply means "absent".
    pub async fn exists(&self, key: &ResourceKey) -> bool {
        match tokio::fs::metadata(self.path_for(key)).await {
            Ok(meta) => meta.is_file(),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(%key, "treating unreadable snapshot metadata as absent: {e}");
                }
                false
            }
        }
    }

    /// Read the snapshot for `key`.
    pub async fn read(&self, key: &ResourceKey) -> Result<String, Error> {
        let path = self.path_for(key);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| Error::StoreRead { path, source })
    }

    /// Persist `content` as the snapshot for `key`.
    ///
    /// Missing parent directories are created. The document is written to a
    /// temporary file beside the target and moved into place without
    /// clobbering, so a reader sees either no snapshot or the whole one. If a
    /// snapshot already exists the first writer wins and this is a no-op.
    pub async fn write(&self, key: &ResourceKey, content: &str) -> Result<(), Error> {
        let path = self.path_for(key);
        let Some(dir) = path.parent().map(Path::to_path_buf) else {
            return Err(Error::StoreWrite { path, source: std::io::ErrorKind::InvalidInput.into() });
        };

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| Error::StoreWrite { path: dir.clone(), source })?;

        let bytes = content.as_bytes().to_vec();
        let target = path.clone();
        let outcome = tokio::task::spawn_blocking(move || -> std::io::Result<bool> {
            let mut temp_file = NamedTempFile::new_in(&dir)?;
            temp_file.write_all(&bytes)?;
            temp_file.as_file().sync_all()?;
            match temp_file.persist_noclobber(&target) {
                Ok(_) => Ok(true),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(e.error),
            }
        })
        .await
        .map_err(|e| Error::StoreWrite { path: path.clone(), source: std::io::Error::other(e) })?;

        match outcome {
            Ok(true) => {
                tracing::debug!("Wrote {} bytes to {}", content.len(), path.display());
                Ok(())
            }
            Ok(false) => {
                tracing::debug!(%key, "snapshot already present, keeping first write");
                Ok(())
            }
            Err(source) => Err(Error::StoreWrite { path, source }),
        }
    }
}
