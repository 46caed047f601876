use actix_web::http::StatusCode;
use actix_web::http::header;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::db::RepositoryError;
use crate::inference::InferenceError;
use crate::prediction::PredictionError;
use crate::storage::StorageError;

/// HTTP-facing error. Bodies are `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    NotAcceptable(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Misconfigured(String),
    #[error("{0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Misconfigured(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if matches!(self, ApiError::Unauthorized(_)) {
            builder.insert_header((header::WWW_AUTHENTICATE, "Basic"));
        }
        builder.json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        log::error!("Repository failure: {}", e);
        ApiError::Internal("Database error".to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(key) => ApiError::NotFound(format!("S3 key not found: {}", key)),
            StorageError::Upstream(msg) => {
                log::error!("Remote storage failure: {}", msg);
                ApiError::Upstream(format!("S3 download error: {}", msg))
            }
            StorageError::NotConfigured => ApiError::Misconfigured(
                "S3 not configured (AWS_REGION/AWS_S3_BUCKET).".to_string(),
            ),
            StorageError::InvalidName(name) => {
                ApiError::Validation(format!("Invalid file name: {}", name))
            }
            StorageError::Io(io) => {
                log::error!("Local storage failure: {}", io);
                ApiError::Internal("Storage error".to_string())
            }
        }
    }
}

impl From<InferenceError> for ApiError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::Decode(err) => {
                log::warn!("Rejected undecodable image: {}", err);
                ApiError::Validation("Uploaded file is not a decodable image".to_string())
            }
            other => {
                log::error!("Inference failure: {}", other);
                ApiError::Internal("Inference failed".to_string())
            }
        }
    }
}

impl From<PredictionError> for ApiError {
    fn from(e: PredictionError) -> Self {
        match e {
            PredictionError::MissingInput => {
                ApiError::Validation("Provide either a file or ?img=<s3_key>".to_string())
            }
            PredictionError::Validation(msg) => ApiError::Validation(msg),
            PredictionError::NotFound(msg) => ApiError::NotFound(msg),
            PredictionError::Forbidden(msg) => ApiError::Forbidden(msg),
            PredictionError::NotAcceptable(msg) => ApiError::NotAcceptable(msg),
            PredictionError::Storage(err) => err.into(),
            PredictionError::Inference(err) => err.into(),
            PredictionError::Repository(err) => err.into(),
            PredictionError::Encode(err) => {
                log::error!("Image encoding failure: {}", err);
                ApiError::Internal("Failed to encode image".to_string())
            }
            PredictionError::Blocking(msg) => {
                log::error!("Blocking task failure: {}", msg);
                ApiError::Internal("Inference failed".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_status_codes() {
        assert_eq!(
            ApiError::from(PredictionError::MissingInput).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StorageError::NotFound("a.jpg".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StorageError::Upstream("timeout".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(StorageError::NotConfigured).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::NotAcceptable("x".into()).status_code(),
            StatusCode::NOT_ACCEPTABLE
        );
    }

    #[test]
    fn missing_key_message_names_key() {
        let err = ApiError::from(StorageError::NotFound("photos/a.jpg".into()));
        assert_eq!(err.to_string(), "S3 key not found: photos/a.jpg");
    }

    #[test]
    fn unauthorized_carries_challenge() {
        let resp = ApiError::Unauthorized("Not authenticated".into()).error_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic"
        );
    }
}
