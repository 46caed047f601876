use aws_config::BehaviorVersion;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use futures::future::BoxFuture;
use std::path::Path;
use std::time::Duration;

use super::{ObjectStore, StorageError};

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }

    /// Builds a client for `region` whose calls are bounded by `timeout`.
    pub async fn connect(bucket_name: String, region: String, timeout: Duration) -> Self {
        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(timeout)
            .build();
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .timeout_config(timeout_config)
            .load()
            .await;
        Self::new(Client::new(&aws_config), bucket_name)
    }

    pub async fn get_image(&self, s3_key: &str) -> Result<Vec<u8>, StorageError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .map(GetObjectError::is_no_such_key)
                    .unwrap_or(false)
                    || matches!(e.code(), Some("NoSuchKey") | Some("NotFound") | Some("404"));
                if not_found {
                    StorageError::NotFound(s3_key.to_string())
                } else {
                    StorageError::Upstream(DisplayErrorContext(&e).to_string())
                }
            })?;

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Upstream(e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }

    pub async fn download_image(&self, s3_key: &str, dest: &Path) -> Result<(), StorageError> {
        let bytes = self.get_image(s3_key).await?;
        tokio::fs::write(dest, bytes).await?;
        log::info!(
            "Downloaded s3://{}/{} to {}",
            self.bucket_name,
            s3_key,
            dest.display()
        );
        Ok(())
    }

    pub async fn upload_image(
        &self,
        src: &Path,
        s3_key: &str,
        mime_type: &str,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| StorageError::Upstream(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .body(body)
            .content_type(mime_type)
            .send()
            .await
            .map_err(|e| StorageError::Upstream(DisplayErrorContext(&e).to_string()))?;

        log::info!("Uploaded s3://{}/{}", self.bucket_name, s3_key);
        Ok(())
    }

    pub async fn delete_image(&self, s3_key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| StorageError::Upstream(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }
}

impl ObjectStore for S3Service {
    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    fn download_to<'a>(
        &'a self,
        key: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(self.download_image(key, dest))
    }

    fn upload_from<'a>(
        &'a self,
        src: &'a Path,
        key: &'a str,
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(self.upload_image(src, key, content_type))
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>> {
        Box::pin(self.get_image(key))
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(self.delete_image(key))
    }
}
