//! Filesystem snapshot store
//!
//! Resolves candidate save keys under the Quake base directory. Missing
//! or unreadable files are simply absent; the session falls through to
//! the next candidate.

use async_trait::async_trait;
use quake_console::SnapshotStore;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Save-file lookup rooted at the Quake base directory.
pub struct FsSnapshotStore {
    base_dir: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn read(&self, key: &str) -> Option<String> {
        let path = self.base_dir.join(key);
        match fs::read_to_string(&path).await {
            Ok(content) if !content.is_empty() => Some(content),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                debug!("snapshot read {} failed: {e}", path.display());
                None
            }
        }
    }
}
