//! Finished images, downloaded on demand.

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::sync::OnceCell;

use crate::error::{PerchanceError, Result};
use crate::image::types::{GenerationParams, ImageFormat};

/// A completed image that has not necessarily been downloaded yet.
///
/// The bytes are fetched on the first [`download`](Self::download) and kept
/// until the artifact is closed or dropped.
#[must_use = "generated image should be downloaded or saved"]
pub struct ImageArtifact {
    id: String,
    file_extension: String,
    width: u32,
    height: u32,
    maybe_nsfw: bool,
    params: GenerationParams,
    client: reqwest::Client,
    base_url: String,
    data: OnceCell<Bytes>,
}

impl ImageArtifact {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        id: impl Into<String>,
        file_extension: impl Into<String>,
        width: u32,
        height: u32,
        maybe_nsfw: bool,
        params: GenerationParams,
    ) -> Self {
        Self {
            id: id.into(),
            file_extension: file_extension.into(),
            width,
            height,
            maybe_nsfw,
            params,
            client,
            base_url: base_url.into(),
            data: OnceCell::new(),
        }
    }

    /// Server-issued image id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// File extension reported by the server, without a dot.
    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    /// Format implied by the file extension, if recognised.
    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::from_extension(&self.file_extension)
    }

    /// Declared `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the server flagged the image as possibly NSFW.
    pub fn maybe_nsfw(&self) -> bool {
        self.maybe_nsfw
    }

    /// Parameters the image was generated with.
    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Default file name, `<id>.<ext>`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, self.file_extension)
    }

    /// Bytes already downloaded, if any.
    pub fn cached(&self) -> Option<&Bytes> {
        self.data.get()
    }

    /// Returns the image bytes, fetching them on the first call only.
    pub async fn download(&self) -> Result<Bytes> {
        let data = self.data.get_or_try_init(|| self.fetch()).await?;
        Ok(data.clone())
    }

    async fn fetch(&self) -> Result<Bytes> {
        let url = format!("{}/downloadTemporaryImage", self.base_url);
        tracing::debug!(image_id = %self.id, "downloading image");

        let response = self
            .client
            .get(&url)
            .query(&[("imageId", self.id.as_str())])
            .send()
            .await
            .map_err(|e| download_failed(&self.id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PerchanceError::Connection(format!(
                "download of image {} returned HTTP {}",
                self.id,
                status.as_u16()
            )));
        }

        response.bytes().await.map_err(|e| download_failed(&self.id, e))
    }

    /// Downloads if needed and writes the image to `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref().to_path_buf();
        let data = self.download().await?;
        tokio::fs::write(&path, &data).await?;
        Ok(path)
    }

    /// Downloads if needed and writes the image to `<id>.<ext>` in the
    /// current directory.
    ///
    /// Fails with [`PerchanceError::Connection`] if the server-issued id or
    /// extension would name a path outside it.
    pub async fn save_default(&self) -> Result<PathBuf> {
        let name = self.file_name();
        if !is_plain_file_name(&self.id) || !is_plain_file_name(&self.file_extension) {
            return Err(PerchanceError::Connection(format!(
                "refusing to save image under unsafe name {name:?}"
            )));
        }
        self.save(name).await
    }

    /// Encodes the image as base64, downloading it if needed.
    pub async fn to_base64(&self) -> Result<String> {
        use base64::Engine;
        let data = self.download().await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(&data))
    }

    /// Returns the image as a data URL, downloading it if needed.
    ///
    /// The MIME type comes from the file extension, or from the bytes
    /// themselves when the extension is not recognised.
    pub async fn to_data_url(&self) -> Result<String> {
        let data = self.download().await?;
        let mime = self
            .format()
            .or_else(|| ImageFormat::sniff(&data))
            .map_or("application/octet-stream", ImageFormat::mime_type);
        Ok(format!("data:{};base64,{}", mime, self.to_base64().await?))
    }

    /// Releases the artifact and any downloaded bytes.
    pub fn close(self) {
        tracing::trace!(
            image_id = %self.id,
            cached = self.data.initialized(),
            "releasing image artifact"
        );
    }
}

impl fmt::Display for ImageArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.id, self.file_extension)
    }
}

impl fmt::Debug for ImageArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageArtifact")
            .field("id", &self.id)
            .field("file_extension", &self.file_extension)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("maybe_nsfw", &self.maybe_nsfw)
            .field("downloaded", &self.data.initialized())
            .finish_non_exhaustive()
    }
}

fn is_plain_file_name(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && !part.contains(['/', '\\', '\0'])
}

fn download_failed(id: &str, err: reqwest::Error) -> PerchanceError {
    PerchanceError::Connection(format!("failed to download image {id}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::types::{ImageRequest, Shape};

    fn artifact() -> ImageArtifact {
        let request = ImageRequest::new("a cat sitting on stairs").with_shape(Shape::Square);
        ImageArtifact::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            "abc123",
            "jpg",
            512,
            512,
            false,
            GenerationParams::from(&request),
        )
    }

    #[test]
    fn test_display_and_size() {
        let image = artifact();
        assert_eq!(image.to_string(), "abc123.jpg");
        assert_eq!(image.file_name(), "abc123.jpg");
        assert_eq!(image.size(), (512, 512));
        assert_eq!(image.format(), Some(ImageFormat::Jpeg));
        assert!(!image.maybe_nsfw());
        assert_eq!(image.params().prompt, "a cat sitting on stairs");
    }

    #[test]
    fn test_not_downloaded_until_asked() {
        let image = artifact();
        assert!(image.cached().is_none());
        assert!(format!("{image:?}").contains("downloaded: false"));
    }

    #[tokio::test]
    async fn test_download_failure_is_connection_error() {
        let image = artifact();
        let err = image.download().await.unwrap_err();
        assert!(matches!(err, PerchanceError::Connection(_)));
        assert!(image.cached().is_none());
    }

    #[tokio::test]
    async fn test_save_default_rejects_path_in_id() {
        let request = ImageRequest::new("x");
        for id in ["../escape", "nested/abc", "..\\abc", ".."] {
            let image = ImageArtifact::new(
                reqwest::Client::new(),
                "http://127.0.0.1:9",
                id,
                "jpg",
                512,
                512,
                false,
                GenerationParams::from(&request),
            );
            let err = image.save_default().await.unwrap_err();
            assert!(
                matches!(&err, PerchanceError::Connection(msg) if msg.contains("unsafe name")),
                "{id}: {err}"
            );
        }
    }

    #[test]
    fn test_plain_file_name() {
        assert!(is_plain_file_name("abc123"));
        assert!(is_plain_file_name("..abc"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name("a/b"));
        assert!(!is_plain_file_name("a\\b"));
    }
}
