//! Image provider trait and utilities.

use crate::error::{ErrorKind, Result};
use crate::image::artifact::ImageArtifact;
use crate::image::types::ImageRequest;
use async_trait::async_trait;

/// Trait for image generators.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generates an image from the given request.
    async fn generate(&self, request: &ImageRequest) -> Result<ImageArtifact>;

    /// Makes sure a usable session key is held, extracting one if needed.
    async fn refresh(&self) -> Result<()>;
}

/// Extension trait for providers with retry logic.
#[async_trait]
pub trait ImageProviderExt: ImageProvider {
    /// Generates with automatic retries on transient failures.
    ///
    /// An auth failure is retried as well: the rejected key has already been
    /// dropped, so the next attempt runs with a freshly extracted one.
    async fn generate_with_retries(
        &self,
        request: &ImageRequest,
        max_retries: u32,
    ) -> Result<ImageArtifact> {
        let mut attempt = 0;

        loop {
            match self.generate(request).await {
                Ok(image) => return Ok(image),
                Err(e)
                    if attempt < max_retries
                        && (e.is_retryable() || e.kind() == ErrorKind::Auth) =>
                {
                    let delay = e.retry_after().unwrap_or(std::time::Duration::ZERO);
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries,
                        delay_ms = delay.as_millis(),
                        "retrying image generation: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T: ImageProvider> ImageProviderExt for T {}
