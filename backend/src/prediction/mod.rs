pub mod deletion_service;
pub mod images;
pub mod ingest;
pub mod pipeline;
pub mod publish;
pub mod query_service;

use crate::auth::Identity;
use crate::db::RepositoryError;
use crate::db::models::PredictionSession;
use crate::inference::InferenceError;
use crate::storage::StorageError;

pub use deletion_service::DeletionService;
pub use images::{ImageBody, ImageService, ServedImage};
pub use ingest::{ImageSource, MaterializedImage, SourceKind};
pub use pipeline::{PredictRequest, PredictionPipeline};
pub use publish::AnnotationPublisher;
pub use query_service::QueryService;

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("No image supplied")]
    MissingInput,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotAcceptable(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Encoding error: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Blocking task error: {0}")]
    Blocking(String),
}

/// Not-found for unknown uids, forbidden for sessions owned by someone else.
pub fn authorize(
    session: Option<PredictionSession>,
    identity: &Identity,
) -> Result<PredictionSession, PredictionError> {
    let session =
        session.ok_or_else(|| PredictionError::NotFound("Prediction not found".to_string()))?;
    if !identity.can_access(session.owner_user_id) {
        log::warn!(
            "User {} denied access to prediction {} owned by {:?}",
            identity.user_id,
            session.uid,
            session.owner_user_id
        );
        return Err(PredictionError::Forbidden(
            "Unauthorized access to this prediction".to_string(),
        ));
    }
    Ok(session)
}
