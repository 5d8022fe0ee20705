//! Session key verification against `/checkVerificationStatus`.

use async_trait::async_trait;

use crate::credential::key::Credential;

/// Outcome of asking the server about a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The server accepted the key.
    Valid,
    /// The server reported the key as not verified.
    Invalid,
    /// The status endpoint could not be reached.
    Unreachable,
}

impl Verification {
    /// True only for [`Verification::Valid`].
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }
}

/// Checks whether a key is still accepted.
#[async_trait]
pub trait KeyVerifier: Send + Sync {
    /// Asks the server about `key`. Never fails; transport trouble is
    /// reported as [`Verification::Unreachable`].
    async fn verify(&self, key: &Credential) -> Verification;
}

/// Verifier that calls `{base_url}/checkVerificationStatus`.
#[derive(Debug, Clone)]
pub struct HttpKeyVerifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpKeyVerifier {
    /// Creates a verifier for the API rooted at `base_url`.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn status_text(&self, key: &Credential) -> reqwest::Result<String> {
        let url = format!("{}/checkVerificationStatus", self.base_url);
        let cache_bust = rand::random::<f64>().to_string();
        self.client
            .get(&url)
            .query(&[("userKey", key.as_str()), ("__cacheBust", cache_bust.as_str())])
            .send()
            .await?
            .text()
            .await
    }
}

#[async_trait]
impl KeyVerifier for HttpKeyVerifier {
    async fn verify(&self, key: &Credential) -> Verification {
        match self.status_text(key).await {
            Ok(body) if body.contains("not_verified") => Verification::Invalid,
            Ok(_) => Verification::Valid,
            Err(e) => {
                tracing::debug!(error = %e, "verification endpoint unreachable");
                Verification::Unreachable
            }
        }
    }
}
