use image::RgbImage;
use shared::ImageKind;
use std::sync::Arc;

use super::ingest::{MaterializedImage, SourceKind};
use super::PredictionError;
use crate::inference::annotate::{encode_image, format_for_extension};
use crate::storage::{ImageLocator, LocalStore, ObjectStore, StorageError, media_type_for_extension};

/// Stores the annotated image next to its source: locally, or in the remote store.
#[derive(Clone)]
pub struct AnnotationPublisher {
    local: LocalStore,
    remote: Option<Arc<dyn ObjectStore>>,
}

impl AnnotationPublisher {
    pub fn new(local: LocalStore, remote: Option<Arc<dyn ObjectStore>>) -> Self {
        Self { local, remote }
    }

    /// Returns the reference to persist for the annotated image.
    pub async fn publish(
        &self,
        annotated: &RgbImage,
        image: &MaterializedImage,
        prefix: &str,
    ) -> Result<String, PredictionError> {
        let bytes = encode_image(annotated, format_for_extension(&image.ext))?;
        match &image.source {
            SourceKind::Local => {
                let path = self
                    .local
                    .save(ImageKind::Predicted, &image.uid, &image.ext, &bytes)
                    .await?;
                Ok(path.to_string_lossy().into_owned())
            }
            SourceKind::Remote { .. } => {
                let store = self.remote.as_deref().ok_or(StorageError::NotConfigured)?;
                let key = format!("{}/predicted/{}{}", prefix, image.uid, image.ext);
                self.upload_via_tempfile(store, &bytes, &key, &image.ext).await?;
                Ok(ImageLocator::remote_uri(store.bucket(), &key))
            }
        }
    }

    async fn upload_via_tempfile(
        &self,
        store: &dyn ObjectStore,
        bytes: &[u8],
        key: &str,
        ext: &str,
    ) -> Result<(), StorageError> {
        let tmp = tempfile::Builder::new()
            .prefix("annotated-")
            .suffix(ext)
            .tempfile()?;
        let result = match tokio::fs::write(tmp.path(), bytes).await {
            Ok(()) => {
                store
                    .upload_from(tmp.path(), key, media_type_for_extension(ext))
                    .await
            }
            Err(e) => Err(StorageError::Io(e)),
        };
        // Removed on both the success and the failure path.
        if let Err(e) = tmp.close() {
            log::warn!("Failed to remove temporary annotated image: {}", e);
        }
        result
    }
}
