pub mod local_store;
pub mod s3_service;

use futures::future::BoxFuture;
use std::path::Path;

pub use local_store::LocalStore;
pub use s3_service::S3Service;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("S3 error: {0}")]
    Upstream(String),
    #[error("Remote storage is not configured")]
    NotConfigured,
    #[error("Invalid file name: {0}")]
    InvalidName(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote object storage consumed by the prediction pipeline.
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Downloads `key` into the file at `dest`.
    fn download_to<'a>(&'a self, key: &'a str, dest: &'a Path)
    -> BoxFuture<'a, Result<(), StorageError>>;

    fn upload_from<'a>(
        &'a self,
        src: &'a Path,
        key: &'a str,
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>>;

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>>;
}

/// Where a stored image lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocator {
    Local(String),
    Remote { bucket: String, key: String },
}

impl ImageLocator {
    pub fn remote_uri(bucket: &str, key: &str) -> String {
        format!("s3://{}/{}", bucket, key)
    }

    /// Parses a stored reference. Anything that is not an `s3://` URI is a local path.
    pub fn parse(reference: &str) -> Self {
        if reference.starts_with("s3://") {
            if let Ok(url) = url::Url::parse(reference) {
                if let Some(bucket) = url.host_str() {
                    let key = url.path().trim_start_matches('/').to_string();
                    if !key.is_empty() {
                        return ImageLocator::Remote {
                            bucket: bucket.to_string(),
                            key,
                        };
                    }
                }
            }
        }
        ImageLocator::Local(reference.to_string())
    }

    /// File extension of the stored object, including the leading dot.
    pub fn extension(&self) -> String {
        let name = match self {
            ImageLocator::Local(path) => path.as_str(),
            ImageLocator::Remote { key, .. } => key.as_str(),
        };
        file_extension(name)
    }
}

/// Extension of the last path segment including the dot, or an empty string.
pub fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

pub fn media_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_remote_locator() {
        let locator = ImageLocator::parse("s3://bucket/room42/predicted/abc.jpg");
        assert_eq!(
            locator,
            ImageLocator::Remote {
                bucket: "bucket".into(),
                key: "room42/predicted/abc.jpg".into()
            }
        );
        assert_eq!(locator.extension(), ".jpg");
    }

    #[test]
    fn plain_paths_are_local() {
        let locator = ImageLocator::parse("uploads/predicted/abc.png");
        assert_eq!(locator, ImageLocator::Local("uploads/predicted/abc.png".into()));
        assert_eq!(locator.extension(), ".png");
    }

    #[test]
    fn media_types() {
        assert_eq!(media_type_for_extension(".JPG"), "image/jpeg");
        assert_eq!(media_type_for_extension(".png"), "image/png");
        assert_eq!(media_type_for_extension(".bin"), "application/octet-stream");
        assert_eq!(media_type_for_extension(""), "application/octet-stream");
    }
}
