use super::{SchemaStore, StoreError};

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const FILE_MODE: u32 = 0o770;
const DIR_MODE: u32 = 0o777;

/// Filesystem-backed schema store.
///
/// Keys are relative paths joined under the configured root; keys containing
/// `/` create subdirectories on demand. Modes are permissive because
/// downstream consumers of the schema files may run under a distinct UID.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(StoreError::Io)?;
        set_mode(&root, DIR_MODE);
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key.trim_start_matches('/'));
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn map_io(key: &str, err: std::io::Error) -> StoreError {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotExist(key.to_string())
        } else {
            StoreError::Io(err)
        }
    }
}

fn set_mode(path: &Path, mode: u32) {
    #[cfg(unix)]
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
        debug!(path = %path.display(), %e, "failed to set permissions");
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
}

#[async_trait]
impl SchemaStore for FileStore {
    async fn read(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| Self::map_io(key, e))
    }

    async fn write(&self, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StoreError::Io)?;
            // intermediate directories up to the root stay world-accessible
            let mut dir = parent.to_path_buf();
            while dir.starts_with(&self.root) && dir != self.root {
                set_mode(&dir, DIR_MODE);
                if !dir.pop() {
                    break;
                }
            }
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(StoreError::Io)?;
        set_mode(&path, FILE_MODE);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Self::map_io(key, e))
    }
}
