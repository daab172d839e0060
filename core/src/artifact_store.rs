use std::io;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

/// Where artifacts produced by data and visualization tools live. Paths are
/// opaque to the dispatch core; only the store interprets them.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Removes the artifact at `path`. An artifact that is already gone is
    /// not an error.
    async fn delete(&self, path: &str) -> io::Result<()>;
}

/// Artifacts stored as files (or directories) on the local filesystem.
#[derive(Debug, Default, Clone)]
pub struct FsArtifactStore;

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn delete(&self, path: &str) -> io::Result<()> {
        let path = Path::new(path);
        let result = match tokio::fs::symlink_metadata(path).await {
            Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                debug!(path = %path.display(), "deleted artifact");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "artifact already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
