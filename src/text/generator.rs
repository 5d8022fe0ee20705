//! Perchance streaming text generator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credential::{
    default_extractor, Credential, CredentialManager, KeyExtractor, StaticKeyExtractor,
};
use crate::error::{PerchanceError, Result};
use crate::text::provider::TextProvider;
use crate::text::stream::TextStream;
use crate::text::types::TextRequest;

/// Text API root.
pub const DEFAULT_BASE_URL: &str = "https://text-generation.perchance.org/api";

/// Env var overriding [`DEFAULT_BASE_URL`].
pub const BASE_URL_ENV: &str = "PERCHANCE_TEXT_BASE_URL";

const DEFAULT_GENERATOR_NAME: &str = "ai-text-generator";

/// Builder for [`TextGenerator`].
#[derive(Default)]
pub struct TextGeneratorBuilder {
    base_url: Option<String>,
    client: Option<reqwest::Client>,
    credentials: Option<Arc<CredentialManager>>,
    extractor: Option<Box<dyn KeyExtractor>>,
    generator_name: Option<String>,
}

impl TextGeneratorBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API root. Falls back to `PERCHANCE_TEXT_BASE_URL`.
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

    /// Overrides the `generatorName` sent with each request.
    pub fn generator_name(mut self, name: impl Into<String>) -> Self {
        self.generator_name = Some(name.into());
        self
    }

    /// Builds the generator, resolving the key source.
    pub fn build(self) -> Result<TextGenerator> {
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

        Ok(TextGenerator {
            client,
            base_url,
            credentials,
            generator_name: self
                .generator_name
                .unwrap_or_else(|| DEFAULT_GENERATOR_NAME.into()),
        })
    }
}

/// Perchance text generator.
pub struct TextGenerator {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialManager>,
    generator_name: String,
}

impl TextGenerator {
    /// Creates a new `TextGeneratorBuilder`.
    pub fn builder() -> TextGeneratorBuilder {
        TextGeneratorBuilder::new()
    }

    /// The credential manager this generator draws keys from.
    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    async fn classify_failure(&self, key: &Credential, status: u16, body: &str) -> PerchanceError {
        let reported = serde_json::from_str::<ErrorResponse>(body)
            .ok()
            .and_then(|r| r.status);

        match reported.as_deref() {
            Some("invalid_key") => {
                self.credentials.invalidate(key).await;
                PerchanceError::Auth("server rejected the session key (invalid_key)".into())
            }
            Some("invalid_data") => PerchanceError::BadRequest(
                "server rejected the request parameters (invalid_data)".into(),
            ),
            Some(other) => PerchanceError::Connection(format!(
                "text generation failed with HTTP {status}: {other}"
            )),
            None => PerchanceError::Connection(format!(
                "text generation failed with HTTP {status}"
            )),
        }
    }
}

#[async_trait]
impl TextProvider for TextGenerator {
    async fn generate(&self, request: &TextRequest) -> Result<TextStream> {
        let key = self.credentials.ensure_valid().await?;

        let url = format!("{}/generate", self.base_url);
        let params = TextParams::new(&key);
        let body = TextBody::new(request, &self.generator_name);

        tracing::debug!(
            request_id = %params.request_id,
            has_start = request.start_with.is_some(),
            "submitting text generation request"
        );

        let response = self
            .client
            .post(&url)
            .query(&params)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.classify_failure(&key, status.as_u16(), &text).await);
        }

        Ok(TextStream::from_body(response.bytes_stream()))
    }

    async fn refresh(&self) -> Result<()> {
        self.credentials.ensure_valid().await.map(|_| ())
    }
}

impl std::fmt::Debug for TextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextGenerator")
            .field("base_url", &self.base_url)
            .field("generator_name", &self.generator_name)
            .finish_non_exhaustive()
    }
}

// Request types
#[derive(Debug, Serialize)]
struct TextParams<'a> {
    #[serde(rename = "userKey")]
    user_key: &'a str,
    #[serde(rename = "__cacheBust")]
    cache_bust: f64,
    #[serde(rename = "requestId")]
    request_id: String,
}

impl<'a> TextParams<'a> {
    fn new(key: &'a Credential) -> Self {
        Self {
            user_key: key.as_str(),
            cache_bust: rand::random(),
            request_id: format!("aiTextCompletion{}", rand::random_range(0..1u32 << 30)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextBody<'a> {
    generator_name: &'a str,
    instruction: &'a str,
    instruction_token_count: u32,
    start_with: &'a str,
    start_with_token_count: u32,
    stop_sequences: Vec<String>,
}

impl<'a> TextBody<'a> {
    fn new(request: &'a TextRequest, generator_name: &'a str) -> Self {
        Self {
            generator_name,
            instruction: &request.instruction,
            instruction_token_count: 1,
            start_with: request.start_with.as_deref().unwrap_or(""),
            start_with_token_count: 1,
            stop_sequences: Vec::new(),
        }
    }
}

// Response types
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    status: Option<String>,
}
