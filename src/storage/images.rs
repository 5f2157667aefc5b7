use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine};
use uuid::Uuid;

use crate::{error::ApiError, IMAGE_EXTENSIONS, RECIPE_IMAGE_DIR};

/// Stores uploaded recipe images on disk and hands back the URL they are
/// served under.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    url_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Parses `data:image/<format>;base64,<payload>`.
pub fn decode_data_url(data: &str) -> Result<DecodedImage, ApiError> {
    let invalid = || ApiError::validation("image: expected a base64 encoded data URL");

    let rest = data.strip_prefix("data:image/").ok_or_else(invalid)?;
    let (format, payload) = rest.split_once(";base64,").ok_or_else(invalid)?;

    let extension = IMAGE_EXTENSIONS
        .iter()
        .find_map(|(name, ext)| (*name == format.to_ascii_lowercase()).then_some(*ext))
        .ok_or_else(|| ApiError::validation(format!("image: unsupported format {format}")))?;

    let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
    if bytes.is_empty() {
        return Err(ApiError::validation("image: empty payload"));
    }

    Ok(DecodedImage { extension, bytes })
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        let mut url_prefix = url_prefix.into();
        if !url_prefix.ends_with('/') {
            url_prefix.push('/');
        }

        Self {
            root: root.into(),
            url_prefix,
        }
    }

    pub async fn save(&self, data_url: &str) -> Result<String, ApiError> {
        let image = decode_data_url(data_url)?;
        let file_name = format!("{}.{}", Uuid::new_v4(), image.extension);

        let dir = self.root.join(RECIPE_IMAGE_DIR);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ApiError::Storage(format!("{}: {e}", dir.display())))?;

        let path = dir.join(&file_name);
        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| ApiError::Storage(format!("{}: {e}", path.display())))?;

        log::debug!("Stored image {}", path.display());

        Ok(format!("{}{RECIPE_IMAGE_DIR}/{file_name}", self.url_prefix))
    }

    /// Removes an image stored by `save`, given the URL it returned. URLs this
    /// store did not hand out are left alone.
    pub async fn discard(&self, url: &str) {
        let file_name = match url
            .strip_prefix(self.url_prefix.as_str())
            .and_then(|rest| rest.strip_prefix(RECIPE_IMAGE_DIR))
            .and_then(|rest| rest.strip_prefix('/'))
        {
            Some(name) if !name.is_empty() && !name.contains(['/', '\\']) && name != ".." => name,
            _ => return,
        };

        let path = self.root.join(RECIPE_IMAGE_DIR).join(file_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => log::debug!("Discarded image {}", path.display()),
            Err(e) => log::warn!("Failed to discard image {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn decodes_known_formats() {
        let image = decode_data_url("data:image/jpeg;base64,aGVsbG8=").unwrap();

        assert_eq!(image.extension, "jpg");
        assert_eq!(image.bytes, b"hello");
    }

    #[test]
    fn rejects_malformed_payloads() {
        for data in [
            "hello",
            "data:text/plain;base64,aGVsbG8=",
            "data:image/png,aGVsbG8=",
            "data:image/png;base64,***",
            "data:image/bmp;base64,aGVsbG8=",
            "data:image/png;base64,",
        ] {
            let err = decode_data_url(data).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{data}");
        }
    }

    #[tokio::test]
    async fn save_writes_file_and_returns_media_url() {
        let root = std::env::temp_dir().join(format!("foodgram-media-{}", Uuid::new_v4()));
        let store = ImageStore::new(&root, "/media");

        let url = store.save("data:image/png;base64,aGVsbG8=").await.unwrap();

        assert!(url.starts_with("/media/recipes/"));
        assert!(url.ends_with(".png"));

        let file_name = url.rsplit('/').next().unwrap();
        let stored = std::fs::read(root.join(RECIPE_IMAGE_DIR).join(file_name)).unwrap();
        assert_eq!(stored, b"hello");

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn discard_removes_only_own_files() {
        let root = std::env::temp_dir().join(format!("foodgram-media-{}", Uuid::new_v4()));
        let store = ImageStore::new(&root, "/media/");

        let kept = store.save("data:image/png;base64,aGVsbG8=").await.unwrap();
        let dropped = store.save("data:image/gif;base64,aGVsbG8=").await.unwrap();

        store.discard(&dropped).await;
        store.discard("/elsewhere/recipes/x.png").await;
        store.discard("/media/recipes/../secret").await;

        let dir = root.join(RECIPE_IMAGE_DIR);
        let name_of = |url: &str| url.rsplit('/').next().unwrap().to_string();
        assert!(dir.join(name_of(&kept)).exists());
        assert!(!dir.join(name_of(&dropped)).exists());

        std::fs::remove_dir_all(&root).unwrap();
    }
}
