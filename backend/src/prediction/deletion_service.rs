use shared::ImageKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{PredictionError, authorize};
use crate::auth::Identity;
use crate::db::session_repository::SessionRepository;
use crate::storage::{ImageLocator, LocalStore, ObjectStore};

#[derive(Clone)]
pub struct DeletionService {
    sessions: SessionRepository,
    local: LocalStore,
    remote: Option<Arc<dyn ObjectStore>>,
}

impl DeletionService {
    pub fn new(
        sessions: SessionRepository,
        local: LocalStore,
        remote: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        Self {
            sessions,
            local,
            remote,
        }
    }

    /// Removes the rows, then makes a best-effort attempt at the backing images.
    pub async fn delete(&self, uid: &str, identity: &Identity) -> Result<(), PredictionError> {
        let session = authorize(self.sessions.get_by_uid(uid).await?, identity)?;

        if !self.sessions.delete_session_cascade(uid).await? {
            // Lost a race with a concurrent delete.
            return Err(PredictionError::NotFound("Prediction not found".to_string()));
        }
        log::info!("User {} deleted prediction {}", identity.user_id, uid);

        self.remove_original(uid, &session.original_image_ref).await;
        self.remove_annotated(&session.annotated_image_ref).await;
        Ok(())
    }

    /// A remote original belongs to the caller; only its local working copy is ours to remove.
    async fn remove_original(&self, uid: &str, reference: &str) {
        let locator = ImageLocator::parse(reference);
        let ext = locator.extension();
        let path = match locator {
            ImageLocator::Local(path) => PathBuf::from(path),
            ImageLocator::Remote { .. } => {
                let ext = if ext.is_empty() { ".jpg".to_string() } else { ext };
                self.local.file_path(ImageKind::Original, uid, &ext)
            }
        };
        LocalStore::remove_quietly(&path).await;
    }

    async fn remove_annotated(&self, reference: &str) {
        match ImageLocator::parse(reference) {
            ImageLocator::Local(path) => LocalStore::remove_quietly(Path::new(&path)).await,
            ImageLocator::Remote { bucket, key } => match self.remote.as_deref() {
                Some(store) if store.bucket() == bucket => {
                    if let Err(e) = store.delete(&key).await {
                        log::warn!("Failed to delete s3://{}/{}: {}", bucket, key, e);
                    }
                }
                _ => log::warn!(
                    "Skipping s3://{}/{}: remote store for that bucket is not configured",
                    bucket,
                    key
                ),
            },
        }
    }
}
