use shared::ImageKind;
use std::path::{Path, PathBuf};

use super::StorageError;

/// Local image areas: `<root>/original` and `<root>/predicted`.
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates both areas if they do not exist yet.
    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(self.area(ImageKind::Original)).await?;
        tokio::fs::create_dir_all(self.area(ImageKind::Predicted)).await?;
        Ok(())
    }

    pub fn area(&self, kind: ImageKind) -> PathBuf {
        self.root.join(kind.as_ref())
    }

    pub fn file_path(&self, kind: ImageKind, uid: &str, ext: &str) -> PathBuf {
        self.area(kind).join(format!("{}{}", uid, ext))
    }

    /// Resolves a caller-supplied file name inside an area.
    pub fn path_for(&self, kind: ImageKind, filename: &str) -> Result<PathBuf, StorageError> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(StorageError::InvalidName(filename.to_string()));
        }
        Ok(self.area(kind).join(filename))
    }

    pub async fn save(
        &self,
        kind: ImageKind,
        uid: &str,
        ext: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = self.file_path(kind, uid, ext);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Best-effort removal; failures are logged and swallowed.
    pub async fn remove_quietly(path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => log::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("Nothing to remove at {}", path.display())
            }
            Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}
