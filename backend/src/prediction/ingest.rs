use shared::ImageKind;
use std::path::PathBuf;

use super::PredictionError;
use crate::auth::Identity;
use crate::storage::{LocalStore, ObjectStore, StorageError, file_extension};

const ANONYMOUS_PREFIX: &str = "anonymous";
const DEFAULT_REMOTE_EXTENSION: &str = ".jpg";

/// Where the bytes for one prediction come from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    LocalUpload { filename: String, bytes: Vec<u8> },
    RemoteObject { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Local,
    Remote { key: String },
}

/// An image copied into the originals area, ready for inference.
#[derive(Debug, Clone)]
pub struct MaterializedImage {
    pub uid: String,
    pub local_path: PathBuf,
    pub ext: String,
    pub source: SourceKind,
}

impl ImageSource {
    pub fn extension(&self) -> String {
        match self {
            ImageSource::LocalUpload { filename, .. } => file_extension(filename),
            ImageSource::RemoteObject { key } => {
                let ext = file_extension(key);
                if ext.is_empty() {
                    DEFAULT_REMOTE_EXTENSION.to_string()
                } else {
                    ext
                }
            }
        }
    }

    /// Writes the image to `original/<uid><ext>`.
    pub async fn materialize(
        self,
        uid: &str,
        local: &LocalStore,
        remote: Option<&dyn ObjectStore>,
    ) -> Result<MaterializedImage, PredictionError> {
        let ext = self.extension();
        match self {
            ImageSource::LocalUpload { bytes, .. } => {
                let local_path = local.save(ImageKind::Original, uid, &ext, &bytes).await?;
                log::info!("Saved upload for {} to {}", uid, local_path.display());
                Ok(MaterializedImage {
                    uid: uid.to_string(),
                    local_path,
                    ext,
                    source: SourceKind::Local,
                })
            }
            ImageSource::RemoteObject { key } => {
                let store = remote.ok_or(StorageError::NotConfigured)?;
                let local_path = local.file_path(ImageKind::Original, uid, &ext);
                store.download_to(&key, &local_path).await?;
                Ok(MaterializedImage {
                    uid: uid.to_string(),
                    local_path,
                    ext,
                    source: SourceKind::Remote { key },
                })
            }
        }
    }
}

/// Remote folder for a request: the caller's chat id, else the identity, else `anonymous`.
pub fn grouping_prefix(chat_id: Option<&str>, identity: Option<&Identity>) -> String {
    match chat_id.filter(|c| !c.is_empty()) {
        Some(chat_id) => safe_prefix(chat_id),
        None => match identity {
            Some(identity) => safe_prefix(&identity.user_id.to_string()),
            None => ANONYMOUS_PREFIX.to_string(),
        },
    }
}

fn safe_prefix(raw: &str) -> String {
    let safe: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = safe.trim_matches('/');
    if trimmed.is_empty() {
        ANONYMOUS_PREFIX.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_precedence() {
        let identity = Identity {
            user_id: 4,
            username: "user".into(),
        };
        assert_eq!(grouping_prefix(Some("room42"), Some(&identity)), "room42");
        assert_eq!(grouping_prefix(None, Some(&identity)), "4");
        assert_eq!(grouping_prefix(Some(""), None), "anonymous");
        assert_eq!(grouping_prefix(None, None), "anonymous");
    }

    #[test]
    fn prefix_is_sanitised() {
        assert_eq!(safe_prefix("chat 1/ü?x"), "chat_1/__x");
        assert_eq!(safe_prefix("team-a/room_2"), "team-a/room_2");
        assert_eq!(safe_prefix("///"), "anonymous");
    }

    #[test]
    fn extensions() {
        let upload = ImageSource::LocalUpload {
            filename: "cat.png".into(),
            bytes: vec![],
        };
        assert_eq!(upload.extension(), ".png");
        let no_ext = ImageSource::LocalUpload {
            filename: "blob".into(),
            bytes: vec![],
        };
        assert_eq!(no_ext.extension(), "");
        let remote = ImageSource::RemoteObject {
            key: "photos/a".into(),
        };
        assert_eq!(remote.extension(), ".jpg");
        let remote_png = ImageSource::RemoteObject {
            key: "photos/a.png".into(),
        };
        assert_eq!(remote_png.extension(), ".png");
    }
}
