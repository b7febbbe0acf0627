//! Filesystem storage backend.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SentinelError};
use crate::storage::Storage;

/// Keeps each session blob (feedback records, cached block list) in its own
/// file under `base_dir`.
///
/// Writes go to a sibling `.tmp` file that is renamed over the target, so a
/// reader never sees a half-written feedback store. Keys must be relative
/// paths that stay inside `base_dir`.
///
/// ```rust,no_run
/// use arx_sentinel::FsStorage;
///
/// let storage = FsStorage::new("/var/lib/arx-sentinel");
/// ```
#[derive(Debug, Clone)]
pub struct FsStorage {
    base_dir: PathBuf,
}

impl FsStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let contained = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(SentinelError::Storage(
                format!("storage key escapes base directory: {key:?}").into(),
            ));
        }
        Ok(self.base_dir.join(relative))
    }
}

fn io_error(e: std::io::Error) -> SentinelError {
    SentinelError::Storage(Box::new(e))
}

impl Storage for FsStorage {
    async fn put(&self, key: &str, content: &[u8], _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        tokio::fs::write(&staging, content).await.map_err(io_error)?;
        tokio::fs::rename(&staging, &path).await.map_err(io_error)?;

        tracing::debug!(key, bytes = content.len(), "Stored session blob");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }
}
