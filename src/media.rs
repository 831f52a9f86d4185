//! Avatar storage on the local filesystem, served under the media URL.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::db::models::DEFAULT_AVATAR;

pub const MAX_AVATAR_SIZE: usize = 5 * 1024 * 1024; // 5MB
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

#[derive(Debug, Error)]
pub enum MediaError {
    /// The upload itself is unacceptable; reported to the client.
    #[error("{0}")]
    Rejected(String),
    #[error("media storage error: {0}")]
    Io(#[from] std::io::Error),
}

fn validate_image_magic_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Relative paths only: no traversal, no absolute roots.
fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains("..")
        && !path.contains('\\')
        && !path.contains('\0')
}

#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    url_prefix: String,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL of a stored relative path.
    pub fn url(&self, relative: &str) -> String {
        format!("{}/{}", self.url_prefix, relative.trim_start_matches('/'))
    }

    /// Validate and write a new avatar for `user_id`, returning its relative
    /// path (`avatars/user_{id}/{uuid}.{ext}`).
    pub async fn save_avatar(
        &self,
        user_id: i64,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, MediaError> {
        let original_ext = original_name
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&original_ext.as_str()) {
            return Err(MediaError::Rejected(
                "Unsupported file type. Allowed: JPEG, PNG, WebP, GIF.".to_string(),
            ));
        }

        if bytes.is_empty() {
            return Err(MediaError::Rejected("Empty file".to_string()));
        }

        if bytes.len() > MAX_AVATAR_SIZE {
            return Err(MediaError::Rejected(
                "File too large. Maximum size is 5MB.".to_string(),
            ));
        }

        let mime_type = validate_image_magic_bytes(bytes).ok_or_else(|| {
            MediaError::Rejected("File content does not match an allowed image type".to_string())
        })?;

        let directory = format!("avatars/user_{user_id}");
        let filename = format!("{}.{}", Uuid::new_v4(), extension_for_mime(mime_type));
        let relative = format!("{directory}/{filename}");

        tokio::fs::create_dir_all(self.root.join(&directory)).await?;
        tokio::fs::write(self.root.join(&relative), bytes).await?;

        tracing::info!(user_id, path = %relative, size = bytes.len(), "avatar stored");
        Ok(relative)
    }

    /// Remove a stored file. The shared default avatar and unknown paths are
    /// left alone.
    pub async fn delete(&self, relative: &str) -> Result<(), MediaError> {
        if relative == DEFAULT_AVATAR || !is_safe_relative(relative) {
            return Ok(());
        }

        match tokio::fs::remove_file(self.root.join(relative)).await {
            Ok(()) => {
                tracing::info!(path = %relative, "media file deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_magic_bytes_detection() {
        assert_eq!(validate_image_magic_bytes(PNG), Some("image/png"));
        assert_eq!(
            validate_image_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some("image/jpeg")
        );
        assert_eq!(validate_image_magic_bytes(b"hello world"), None);
        assert_eq!(validate_image_magic_bytes(&[0xFF]), None);
    }

    #[test]
    fn test_url_joins_prefix() {
        let media = MediaStorage::new("media", "/media");
        assert_eq!(media.url("avatars/default.png"), "/media/avatars/default.png");
    }

    #[tokio::test]
    async fn test_save_and_delete_avatar() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStorage::new(dir.path(), "/media");

        let relative = media.save_avatar(3, "me.png", PNG).await.unwrap();
        assert!(relative.starts_with("avatars/user_3/"));
        assert!(relative.ends_with(".png"));
        assert!(dir.path().join(&relative).exists());

        media.delete(&relative).await.unwrap();
        assert!(!dir.path().join(&relative).exists());
    }

    #[tokio::test]
    async fn test_save_avatar_rejects_bad_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStorage::new(dir.path(), "/media");

        let err = media.save_avatar(1, "notes.txt", PNG).await.unwrap_err();
        assert!(matches!(err, MediaError::Rejected(_)));

        let err = media.save_avatar(1, "fake.png", b"not an image").await.unwrap_err();
        assert!(matches!(err, MediaError::Rejected(_)));

        let err = media.save_avatar(1, "empty.png", &[]).await.unwrap_err();
        assert!(matches!(err, MediaError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_delete_ignores_default_and_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStorage::new(dir.path(), "/media");
        assert!(media.delete(DEFAULT_AVATAR).await.is_ok());
        assert!(media.delete("../etc/passwd").await.is_ok());
    }
}
