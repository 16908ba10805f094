//! Persistence for session snapshots.

use std::path::PathBuf;

use futures_util::future::BoxFuture;

use crate::error::StorageError;

/// Where encoded session snapshots are kept between runs.
pub trait SnapshotStore: Send + Sync + 'static {
    fn save(&self, data: String) -> BoxFuture<'_, Result<(), StorageError>>;

    fn load(&self) -> BoxFuture<'_, Result<Option<String>, StorageError>>;
}

/// Stores the snapshot as a single JSON file.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, data: String) -> BoxFuture<'_, Result<(), StorageError>> {
        Box::pin(async move {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_err(e))?;
            }
            // Readers only ever see a complete file.
            let tmp = self.path.with_extension("json.tmp");
            tokio::fs::write(&tmp, data).await.map_err(|e| self.io_err(e))?;
            tokio::fs::rename(&tmp, &self.path)
                .await
                .map_err(|e| self.io_err(e))
        })
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<String>, StorageError>> {
        Box::pin(async move {
            match tokio::fs::read_to_string(&self.path).await {
                Ok(data) => Ok(Some(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(self.io_err(e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("state/session.json"));
        assert_eq!(store.load().await.unwrap(), None);

        store.save(r#"{"docName":"a.mdk"}"#.to_string()).await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some(r#"{"docName":"a.mdk"}"#));
    }
}
