//! Perchance text-to-image generator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credential::{
    default_extractor, Credential, CredentialManager, KeyExtractor, StaticKeyExtractor,
};
use crate::deadline::{Clock, DeadlineGuard, SystemClock};
use crate::error::{PerchanceError, Result};
use crate::image::artifact::ImageArtifact;
use crate::image::provider::ImageProvider;
use crate::image::types::{GenerationParams, ImageRequest};

/// Image API root.
pub const DEFAULT_BASE_URL: &str = "https://image-generation.perchance.org/api";

/// Env var overriding [`DEFAULT_BASE_URL`].
pub const BASE_URL_ENV: &str = "PERCHANCE_IMAGE_BASE_URL";

const DEFAULT_CHANNEL: &str = "ai-text-to-image-generator";
const DEFAULT_SUB_CHANNEL: &str = "public";

/// Builder for [`ImageGenerator`].
pub struct ImageGeneratorBuilder {
    base_url: Option<String>,
    client: Option<reqwest::Client>,
    credentials: Option<Arc<CredentialManager>>,
    extractor: Option<Box<dyn KeyExtractor>>,
    poll_interval: Duration,
    timeout: Duration,
    channel: String,
    sub_channel: String,
    clock: Arc<dyn Clock>,
}

impl Default for ImageGeneratorBuilder {
    fn default() -> Self {
        Self {
            base_url: None,
            client: None,
            credentials: None,
            extractor: None,
            poll_interval: Duration::from_secs(4),
            timeout: Duration::from_secs(20),
            channel: DEFAULT_CHANNEL.into(),
            sub_channel: DEFAULT_SUB_CHANNEL.into(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl ImageGeneratorBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API root. Falls back to `PERCHANCE_IMAGE_BASE_URL`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Uses a preconfigured HTTP client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Shares an existing credential manager.
    pub fn credentials(mut self, manager: Arc<CredentialManager>) -> Self {
        self.credentials = Some(manager);
        self
    }

    /// Obtains keys with the given extractor.
    pub fn key_extractor(mut self, extractor: impl KeyExtractor + 'static) -> Self {
        self.extractor = Some(Box::new(extractor));
        self
    }

    /// Uses a known session key.
    pub fn user_key(self, key: impl Into<String>) -> Self {
        self.key_extractor(StaticKeyExtractor::new(key))
    }

    /// Sets the wait between status polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the maximum time to wait for generation.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the `channel` request parameter.
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Overrides the `subChannel` request parameter.
    pub fn sub_channel(mut self, sub_channel: impl Into<String>) -> Self {
        self.sub_channel = sub_channel.into();
        self
    }

    /// Sets the clock the generation deadline is measured on.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the generator, resolving the key source.
    pub fn build(self) -> Result<ImageGenerator> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var(BASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let client = self.client.unwrap_or_default();

        let credentials = match (self.credentials, self.extractor) {
            (Some(manager), _) => manager,
            (None, Some(extractor)) => Arc::new(CredentialManager::for_endpoint(
                client.clone(),
                base_url.clone(),
                extractor,
            )),
            (None, None) => Arc::new(CredentialManager::for_endpoint(
                client.clone(),
                base_url.clone(),
                default_extractor()?,
            )),
        };

        Ok(ImageGenerator {
            client,
            base_url,
            credentials,
            poll_interval: self.poll_interval,
            timeout: self.timeout,
            channel: self.channel,
            sub_channel: self.sub_channel,
            clock: self.clock,
        })
    }
}

/// Perchance image generator.
pub struct ImageGenerator {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialManager>,
    poll_interval: Duration,
    timeout: Duration,
    channel: String,
    sub_channel: String,
    clock: Arc<dyn Clock>,
}

impl ImageGenerator {
    /// Creates a new `ImageGeneratorBuilder`.
    pub fn builder() -> ImageGeneratorBuilder {
        ImageGeneratorBuilder::new()
    }

    /// The credential manager this generator draws keys from.
    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    async fn submit(&self, key: &Credential, request: &ImageRequest) -> Result<SubmitResponse> {
        let url = format!("{}/generate", self.base_url);
        let params = SubmitParams::new(key, request, &self.channel, &self.sub_channel);

        let response = self.client.post(&url).query(&params).send().await?;
        let status = response.status();
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            PerchanceError::Connection(format!(
                "undecodable image generation response (HTTP {}): {e}",
                status.as_u16()
            ))
        })
    }

    /// Submit until the server reports a terminal status or the deadline passes.
    async fn poll_until_ready(
        &self,
        key: &Credential,
        request: &ImageRequest,
    ) -> Result<CompletedImage> {
        let guard = DeadlineGuard::with_clock(
            self.timeout,
            PerchanceError::Timeout,
            self.clock.clone(),
        );
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            guard.tick()?;
            attempt += 1;

            let body = self.submit(key, request).await?;

            match body.status.as_str() {
                "success" => return body.into_completed(request),
                "invalid_key" => {
                    self.credentials.invalidate(key).await;
                    return Err(PerchanceError::Auth(
                        "server rejected the session key (invalid_key)".into(),
                    ));
                }
                "invalid_data" => {
                    return Err(PerchanceError::BadRequest(
                        "server rejected the request parameters (invalid_data)".into(),
                    ));
                }
                other => {
                    tracing::debug!(
                        status = %other,
                        attempt,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "image still generating"
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl ImageProvider for ImageGenerator {
    async fn generate(&self, request: &ImageRequest) -> Result<ImageArtifact> {
        request.validate()?;
        let start = Instant::now();

        let key = self.credentials.ensure_valid().await?;
        tracing::debug!(
            resolution = request.shape.resolution(),
            seed = request.seed,
            "submitting image generation request"
        );

        let done = self.poll_until_ready(&key, request).await?;
        tracing::debug!(
            image_id = %done.image_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "image generation complete"
        );

        Ok(ImageArtifact::new(
            self.client.clone(),
            self.base_url.clone(),
            done.image_id,
            done.file_extension,
            done.width,
            done.height,
            done.maybe_nsfw,
            GenerationParams::from(request),
        ))
    }

    async fn refresh(&self) -> Result<()> {
        self.credentials.ensure_valid().await.map(|_| ())
    }
}

impl std::fmt::Debug for ImageGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageGenerator")
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// Request types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitParams<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    user_key: &'a str,
    #[serde(rename = "__cache_bust")]
    cache_bust: f64,
    seed: i64,
    resolution: &'static str,
    guidance_scale: f32,
    channel: &'a str,
    sub_channel: &'a str,
    request_id: f64,
}

impl<'a> SubmitParams<'a> {
    fn new(
        key: &'a Credential,
        request: &'a ImageRequest,
        channel: &'a str,
        sub_channel: &'a str,
    ) -> Self {
        Self {
            prompt: &request.prompt,
            negative_prompt: request.negative_prompt.as_deref().unwrap_or(""),
            user_key: key.as_str(),
            cache_bust: rand::random(),
            seed: request.seed,
            resolution: request.shape.resolution(),
            guidance_scale: request.guidance_scale,
            channel,
            sub_channel,
            request_id: rand::random(),
        }
    }
}

// Response types
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    status: String,
    #[serde(default)]
    image_id: Option<String>,
    #[serde(default)]
    file_extension: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    maybe_nsfw: bool,
}

#[derive(Debug)]
struct CompletedImage {
    image_id: String,
    file_extension: String,
    width: u32,
    height: u32,
    maybe_nsfw: bool,
}

impl SubmitResponse {
    fn into_completed(self, request: &ImageRequest) -> Result<CompletedImage> {
        let image_id = self.image_id.filter(|id| !id.is_empty()).ok_or_else(|| {
            PerchanceError::Connection("success response without imageId".into())
        })?;
        let file_extension = self.file_extension.ok_or_else(|| {
            PerchanceError::Connection("success response without fileExtension".into())
        })?;
        let (default_width, default_height) = request.shape.dimensions();

        Ok(CompletedImage {
            image_id,
            file_extension,
            width: self.width.unwrap_or(default_width),
            height: self.height.unwrap_or(default_height),
            maybe_nsfw: self.maybe_nsfw,
        })
    }
}
