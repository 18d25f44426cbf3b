//! Artifact store
//!
//! Durable key → JSON document storage. [`FsArtifactStore`] lays artifacts out
//! under the storage root as `reports/<stem>.json` and
//! `scraped-data/<stem>.json`. Keys are validated when an [`ArtifactKey`] is
//! built, so path mapping here only ever sees allow-listed components.
//!
//! Writes go to a uniquely named temp file in the destination directory and
//! are then renamed over the target, so readers observe either the old or the
//! new document, never a partial one.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use pulse_common::{ArtifactKey, Error, Namespace, Result};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// A stored, JSON-serializable report.
///
/// Cloning is cheap; every waiter on a production shares the same document.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact(Arc<Value>);

impl Artifact {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Serialized form written to storage
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self.value())
            .map_err(|e| Error::CorruptData(format!("artifact is not serializable: {}", e)))
    }

    /// Parse stored bytes; anything that is not JSON is corrupt
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self::new)
    }
}

impl From<Value> for Artifact {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Storage backend used by the cache orchestrator
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Whether an artifact is stored under `key`. I/O faults read as absent.
    async fn exists(&self, key: &ArtifactKey) -> bool;

    /// Fails with `NotFound` if absent, `CorruptData` if unparsable
    async fn read(&self, key: &ArtifactKey) -> Result<Artifact>;

    /// Atomic overwrite; last writer wins
    async fn write(&self, key: &ArtifactKey, artifact: &Artifact) -> Result<()>;

    /// Returns whether something was removed
    async fn delete(&self, key: &ArtifactKey) -> Result<bool>;
}

/// Filesystem-backed artifact store
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the namespace directories if missing
    pub async fn ensure_layout(&self) -> Result<()> {
        for namespace in [Namespace::Reports, Namespace::ScrapedData] {
            let dir = self.namespace_dir(namespace);
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                Error::StorageUnavailable(format!(
                    "cannot create {} directory: {}",
                    namespace.dir_name(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Raw stored bytes for `key`
    pub async fn read_bytes(&self, key: &ArtifactKey) -> Result<Vec<u8>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == IoErrorKind::NotFound => Err(Error::NotFound(key.to_string())),
            Err(e) => Err(io_error(key, "reading", e)),
        }
    }

    /// Absolute path the artifact for `key` is stored at
    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.namespace_dir(key.namespace()).join(key.file_name())
    }

    fn namespace_dir(&self, namespace: Namespace) -> PathBuf {
        self.root.join(namespace.dir_name())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn exists(&self, key: &ArtifactKey) -> bool {
        match tokio::fs::try_exists(self.path_for(key)).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(key = %key, "Existence check failed, treating as absent: {}", e);
                false
            }
        }
    }

    async fn read(&self, key: &ArtifactKey) -> Result<Artifact> {
        let bytes = self.read_bytes(key).await?;
        Artifact::from_bytes(&bytes)
            .map_err(|e| Error::CorruptData(format!("{} is not valid JSON: {}", key, e)))
    }

    async fn write(&self, key: &ArtifactKey, artifact: &Artifact) -> Result<()> {
        let bytes = artifact.to_bytes()?;
        let dir = self.namespace_dir(key.namespace());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(key, "preparing directory for", e))?;

        let target = dir.join(key.file_name());
        let temp = dir.join(format!(".{}.{}.tmp", key.file_stem(), Uuid::new_v4()));

        if let Err(e) = write_synced(&temp, &bytes).await {
            discard_temp(&temp).await;
            return Err(io_error(key, "writing", e));
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            discard_temp(&temp).await;
            return Err(io_error(key, "committing", e));
        }

        debug!(key = %key, bytes = bytes.len(), "Artifact written");
        Ok(())
    }

    async fn delete(&self, key: &ArtifactKey) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => {
                debug!(key = %key, "Artifact deleted");
                Ok(true)
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(key, "deleting", e)),
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

async fn discard_temp(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != IoErrorKind::NotFound {
            warn!("Failed to remove temp file {}: {}", path.display(), e);
        }
    }
}

/// Messages name the key, not the on-disk path
fn io_error(key: &ArtifactKey, action: &str, e: std::io::Error) -> Error {
    Error::StorageUnavailable(format!("{} {}: {}", action, key, e))
}
