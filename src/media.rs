use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("not a base64 image data URL")]
    InvalidDataUrl,

    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Image host. Uploads return the public URL of the stored image.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, data_url: &str) -> Result<String, MediaError>;

    async fn destroy(&self, public_id: &str) -> Result<(), MediaError>;

    /// The public id behind `url` when this store issued it, `None` for
    /// anything hosted elsewhere.
    fn public_id<'a>(&self, url: &'a str) -> Option<&'a str>;
}

/// Stores images as files under one directory, served back at `/media/{file}`.
pub struct LocalMediaStore {
    root: PathBuf,
    base_url: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: format!("{}/media", public_url.trim_end_matches('/')),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(&self, data_url: &str) -> Result<String, MediaError> {
        let (mime, bytes) = decode_data_url(data_url)?;
        let ext = extension_for(mime).ok_or_else(|| MediaError::UnsupportedType(mime.into()))?;

        tokio::fs::create_dir_all(&self.root).await?;
        let file = format!("{}.{}", uuid::Uuid::now_v7(), ext);
        tokio::fs::write(self.root.join(&file), &bytes).await?;

        tracing::debug!("Stored image {} ({} bytes)", file, bytes.len());
        Ok(format!("{}/{}", self.base_url, file))
    }

    async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
        if public_id.is_empty()
            || public_id.contains(&['/', '\\'][..])
            || public_id.starts_with('.')
        {
            return Ok(());
        }

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(public_id) {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    fn public_id<'a>(&self, url: &'a str) -> Option<&'a str> {
        let file = url.strip_prefix(self.base_url.as_str())?.strip_prefix('/')?;
        if file.contains('/') {
            return None;
        }
        public_id_from_url(file)
    }
}

/// Splits `data:image/<type>;base64,<payload>` into its MIME type and bytes.
pub fn decode_data_url(data_url: &str) -> Result<(&str, Vec<u8>), MediaError> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or(MediaError::InvalidDataUrl)?;
    let (meta, payload) = rest.split_once(',').ok_or(MediaError::InvalidDataUrl)?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or(MediaError::InvalidDataUrl)?;
    if !mime.starts_with("image/") {
        return Err(MediaError::UnsupportedType(mime.to_string()));
    }
    let bytes = general_purpose::STANDARD.decode(payload.trim())?;
    Ok((mime, bytes))
}

fn extension_for(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/svg+xml" => Some("svg"),
        _ => mime_guess::get_mime_extensions_str(mime).and_then(|exts| exts.first().copied()),
    }
}

/// The public id of a hosted image: its last path segment without extension.
fn public_id_from_url(url: &str) -> Option<&str> {
    let segment = url
        .split(&['?', '#'][..])
        .next()?
        .trim_end_matches('/')
        .rsplit('/')
        .next()?;
    let id = segment.split('.').next()?;
    (!id.is_empty()).then_some(id)
}

/// Turns a client-supplied image into a stored URL. Data URLs are uploaded,
/// http(s) URLs are kept as they are.
pub async fn store_image(media: &dyn MediaStore, image: &str) -> AppResult<String> {
    if image.starts_with("data:") {
        Ok(media.upload(image).await?)
    } else if image.starts_with("http://") || image.starts_with("https://") {
        Ok(image.to_string())
    } else {
        Err(AppError::BadRequest("Invalid image".into()))
    }
}

/// Best-effort removal of a stored image; failures are logged, never returned.
pub async fn discard_image(media: &dyn MediaStore, url: &str) {
    let Some(public_id) = media.public_id(url) else {
        tracing::debug!("Not removing externally hosted image {}", url);
        return;
    };
    if let Err(e) = media.destroy(public_id).await {
        tracing::warn!("Failed to remove image {}: {}", public_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8/5+hHgAHggJ/PchI7wAAAABJRU5ErkJggg==";

    #[test]
    fn decodes_png_data_url() {
        let (mime, bytes) = decode_data_url(PIXEL).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn rejects_non_image_and_malformed_data_urls() {
        assert!(matches!(
            decode_data_url("https://example.com/a.png"),
            Err(MediaError::InvalidDataUrl)
        ));
        assert!(matches!(
            decode_data_url("data:text/plain;base64,aGk="),
            Err(MediaError::UnsupportedType(_))
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64,@@@"),
            Err(MediaError::Decode(_))
        ));
    }

    #[test]
    fn extension_lookup() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/not-a-thing"), None);
    }

    #[test]
    fn public_id_is_last_segment_without_extension() {
        assert_eq!(
            public_id_from_url("http://localhost:5000/media/0190abcd.png"),
            Some("0190abcd")
        );
        assert_eq!(
            public_id_from_url("https://res.example.com/v1/abc.def.jpg?x=1"),
            Some("abc")
        );
        assert_eq!(public_id_from_url(""), None);
    }

    #[tokio::test]
    async fn upload_then_destroy_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(tmp.path().join("uploads"), "http://localhost:5000/");

        let url = store.upload(PIXEL).await.unwrap();
        assert!(url.starts_with("http://localhost:5000/media/"));
        assert!(url.ends_with(".png"));

        let file = url.rsplit('/').next().unwrap();
        assert!(store.root().join(file).exists());

        store.destroy(store.public_id(&url).unwrap()).await.unwrap();
        assert!(!store.root().join(file).exists());
    }

    #[test]
    fn only_issued_urls_have_a_public_id() {
        let store = LocalMediaStore::new("uploads", "http://localhost:5000");
        assert_eq!(
            store.public_id("http://localhost:5000/media/0190abcd.png"),
            Some("0190abcd")
        );
        assert_eq!(store.public_id("https://elsewhere.example/0190abcd.png"), None);
        assert_eq!(store.public_id("https://elsewhere.example/media/0190abcd.png"), None);
        assert_eq!(store.public_id("http://localhost:5000/media/sub/0190abcd.png"), None);

        let relative = LocalMediaStore::new("uploads", "");
        assert_eq!(relative.public_id("/media/0190abcd.png"), Some("0190abcd"));
        assert_eq!(relative.public_id("https://x.example/media/0190abcd.png"), None);
    }

    #[tokio::test]
    async fn discarding_a_foreign_url_keeps_local_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(tmp.path(), "");
        let url = store.upload(PIXEL).await.unwrap();
        let file = url.rsplit('/').next().unwrap();

        discard_image(&store, &format!("https://elsewhere.example/{}", file)).await;
        assert!(store.root().join(file).exists());

        discard_image(&store, &url).await;
        assert!(!store.root().join(file).exists());
    }

    #[tokio::test]
    async fn destroy_of_unknown_id_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(tmp.path(), "");
        tokio_test::assert_ok!(store.destroy("nothing-here").await);
        tokio_test::assert_ok!(store.destroy("../escape").await);
    }

    #[tokio::test]
    async fn store_image_classifies_input() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(tmp.path(), "");

        let kept = store_image(&store, "https://cdn.example.com/a.jpg").await.unwrap();
        assert_eq!(kept, "https://cdn.example.com/a.jpg");

        let uploaded = store_image(&store, PIXEL).await.unwrap();
        assert!(uploaded.starts_with("/media/"));

        let err = store_image(&store, "ftp://nope").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "Invalid image"));

        let err = store_image(&store, "data:image/png;base64,@@@").await.unwrap_err();
        assert!(matches!(err, AppError::Upload(_)));
    }
}
