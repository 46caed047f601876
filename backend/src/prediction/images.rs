use actix_web::http::header::{Accept, Quality};
use image::ImageFormat;
use shared::ImageKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{PredictionError, authorize};
use crate::auth::Identity;
use crate::db::session_repository::SessionRepository;
use crate::inference::annotate::encode_image;
use crate::storage::{ImageLocator, LocalStore, ObjectStore, StorageError, media_type_for_extension};

const IMAGE_NOT_FOUND: &str = "Image not found";

#[derive(Debug)]
pub enum ImageBody {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// An image ready to be written to the response.
#[derive(Debug)]
pub struct ServedImage {
    pub body: ImageBody,
    pub content_type: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    AsStored,
    Reencode(ImageFormat),
}

/// Authorized access to stored original and annotated images.
#[derive(Clone)]
pub struct ImageService {
    sessions: SessionRepository,
    local: LocalStore,
    remote: Option<Arc<dyn ObjectStore>>,
}

impl ImageService {
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

    /// Resolves `<kind>/<filename>` in the local areas; the file stem is the session uid.
    pub async fn stored_image(
        &self,
        kind: ImageKind,
        filename: &str,
        identity: &Identity,
    ) -> Result<PathBuf, PredictionError> {
        let path = self.local.path_for(kind, filename)?;
        let uid = Path::new(filename)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| PredictionError::NotFound(IMAGE_NOT_FOUND.to_string()))?;

        authorize(self.sessions.get_by_uid(uid).await?, identity)?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(PredictionError::NotFound(IMAGE_NOT_FOUND.to_string()));
        }
        Ok(path)
    }

    /// The annotated image of a session, in a representation the client accepts.
    pub async fn annotated_image(
        &self,
        uid: &str,
        identity: &Identity,
        accept: Option<&Accept>,
    ) -> Result<ServedImage, PredictionError> {
        let session = authorize(self.sessions.get_by_uid(uid).await?, identity)?;
        let locator = ImageLocator::parse(&session.annotated_image_ref);
        let stored_type = media_type_for_extension(&locator.extension());

        let representation = negotiate(accept, stored_type).ok_or_else(|| {
            PredictionError::NotAcceptable(format!(
                "Cannot serve {} or a re-encoded image for Accept: {}",
                stored_type,
                accept.map(ToString::to_string).unwrap_or_default()
            ))
        })?;

        let body = match locator {
            ImageLocator::Local(path) => {
                let path = PathBuf::from(path);
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Err(PredictionError::NotFound(IMAGE_NOT_FOUND.to_string()));
                }
                ImageBody::File(path)
            }
            ImageLocator::Remote { bucket, key } => {
                let store = self
                    .remote
                    .as_deref()
                    .filter(|store| store.bucket() == bucket)
                    .ok_or(StorageError::NotConfigured)?;
                ImageBody::Bytes(store.get(&key).await?)
            }
        };

        match representation {
            Representation::AsStored => Ok(ServedImage {
                body,
                content_type: stored_type,
            }),
            Representation::Reencode(format) => {
                let bytes = match body {
                    ImageBody::File(path) => tokio::fs::read(&path).await.map_err(StorageError::Io)?,
                    ImageBody::Bytes(bytes) => bytes,
                };
                let decoded = image::load_from_memory(&bytes)?;
                log::debug!("Re-encoding annotated image {} as {:?}", uid, format);
                Ok(ServedImage {
                    body: ImageBody::Bytes(encode_image(&decoded.to_rgb8(), format)?),
                    content_type: format.to_mime_type(),
                })
            }
        }
    }
}

/// Quality the client assigns to `media_type`, taken from the most specific matching range.
fn quality_for(accept: &Accept, media_type: &str) -> Quality {
    let Some((kind, subtype)) = media_type.split_once('/') else {
        return Quality::ZERO;
    };
    accept
        .iter()
        .filter_map(|range| {
            let specificity = match (range.item.type_().as_str(), range.item.subtype().as_str()) {
                ("*", "*") => 0u8,
                (k, "*") if k.eq_ignore_ascii_case(kind) => 1,
                (k, s) if k.eq_ignore_ascii_case(kind) && s.eq_ignore_ascii_case(subtype) => 2,
                _ => return None,
            };
            Some((specificity, range.quality))
        })
        .max()
        .map(|(_, quality)| quality)
        .unwrap_or(Quality::ZERO)
}

/// Picks how to serve an image stored as `stored_type`, or `None` when nothing offered is acceptable.
pub fn negotiate(accept: Option<&Accept>, stored_type: &str) -> Option<Representation> {
    let accept = match accept {
        Some(accept) if !accept.is_empty() => accept,
        _ => return Some(Representation::AsStored),
    };
    if quality_for(accept, stored_type) > Quality::ZERO {
        return Some(Representation::AsStored);
    }

    [ImageFormat::Png, ImageFormat::Jpeg]
        .into_iter()
        .map(|format| (quality_for(accept, format.to_mime_type()), format))
        .filter(|(quality, _)| *quality > Quality::ZERO)
        .max_by_key(|(quality, _)| *quality)
        .map(|(_, format)| Representation::Reencode(format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::{self, Header};
    use actix_web::test::TestRequest;

    fn accept(value: &str) -> Accept {
        let req = TestRequest::default()
            .insert_header((header::ACCEPT, value))
            .to_http_request();
        Accept::parse(&req).unwrap()
    }

    #[test]
    fn missing_or_wildcard_accept_serves_stored() {
        assert_eq!(negotiate(None, "image/jpeg"), Some(Representation::AsStored));
        assert_eq!(negotiate(Some(&accept("*/*")), "image/jpeg"), Some(Representation::AsStored));
        assert_eq!(negotiate(Some(&accept("image/*")), "image/png"), Some(Representation::AsStored));
    }

    #[test]
    fn reencodes_to_accepted_format() {
        assert_eq!(
            negotiate(Some(&accept("image/png")), "image/jpeg"),
            Some(Representation::Reencode(ImageFormat::Png))
        );
        assert_eq!(
            negotiate(Some(&accept("image/png;q=0.4, image/jpeg;q=0.9")), "application/octet-stream"),
            Some(Representation::Reencode(ImageFormat::Jpeg))
        );
    }

    #[test]
    fn explicit_zero_quality_excludes_stored_type() {
        assert_eq!(
            negotiate(Some(&accept("image/*, image/jpeg;q=0")), "image/jpeg"),
            Some(Representation::Reencode(ImageFormat::Png))
        );
    }

    #[test]
    fn nothing_acceptable() {
        assert_eq!(negotiate(Some(&accept("text/html")), "image/jpeg"), None);
        assert_eq!(negotiate(Some(&accept("application/json, text/*")), "image/png"), None);
    }
}
