//! Ownership and refresh of the current session key.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::credential::extractor::KeyExtractor;
use crate::credential::key::Credential;
use crate::credential::verifier::{HttpKeyVerifier, KeyVerifier, Verification};
use crate::error::{PerchanceError, Result};

/// Something that can mint and check session keys for one modality.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Obtains a brand new key.
    async fn fetch(&self) -> Result<Credential>;

    /// Asks the server whether `key` is still accepted.
    async fn verify(&self, key: &Credential) -> Verification;
}

/// A [`KeyExtractor`] paired with a [`KeyVerifier`].
pub struct ProviderCredentials<E, V = HttpKeyVerifier> {
    extractor: E,
    verifier: V,
}

impl<E, V> ProviderCredentials<E, V>
where
    E: KeyExtractor,
    V: KeyVerifier,
{
    /// Combines an extractor and a verifier.
    pub fn new(extractor: E, verifier: V) -> Self {
        Self {
            extractor,
            verifier,
        }
    }
}

#[async_trait]
impl<E, V> CredentialSource for ProviderCredentials<E, V>
where
    E: KeyExtractor,
    V: KeyVerifier,
{
    async fn fetch(&self) -> Result<Credential> {
        let raw = self.extractor.extract().await?;
        Credential::new(raw)
    }

    async fn verify(&self, key: &Credential) -> Verification {
        self.verifier.verify(key).await
    }
}

/// Holds the current session key and refreshes it on demand.
///
/// Calls to [`ensure_valid`](Self::ensure_valid) are serialized, so one
/// manager never runs two extractions at once. Share it behind an `Arc`.
pub struct CredentialManager {
    source: Box<dyn CredentialSource>,
    current: Mutex<Option<Credential>>,
}

impl CredentialManager {
    /// Creates a manager with no key held yet.
    pub fn new(source: impl CredentialSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            current: Mutex::new(None),
        }
    }

    /// Creates a manager seeded with a known key.
    pub fn with_credential(source: impl CredentialSource + 'static, key: Credential) -> Self {
        Self {
            source: Box::new(source),
            current: Mutex::new(Some(key)),
        }
    }

    /// Manager that extracts with `extractor` and verifies against the API
    /// rooted at `base_url`.
    pub fn for_endpoint(
        client: reqwest::Client,
        base_url: impl Into<String>,
        extractor: impl KeyExtractor + 'static,
    ) -> Self {
        Self::new(ProviderCredentials::new(
            extractor,
            HttpKeyVerifier::new(client, base_url),
        ))
    }

    /// Returns a key the server currently accepts.
    ///
    /// Extracts a new key when none is held or when verification reports it
    /// invalid or unreachable. Extraction runs at most once per call and any
    /// failure is reported as [`PerchanceError::Connection`].
    pub async fn ensure_valid(&self) -> Result<Credential> {
        let mut current = self.current.lock().await;

        if let Some(key) = current.as_ref() {
            match self.source.verify(key).await {
                Verification::Valid => return Ok(key.clone()),
                outcome => {
                    tracing::warn!(?outcome, "session key not accepted, refreshing");
                }
            }
        } else {
            tracing::debug!("no session key held, extracting");
        }

        let fresh = self.source.fetch().await.map_err(extraction_failed)?;
        tracing::debug!(key_len = fresh.len(), "obtained new session key");
        *current = Some(fresh.clone());
        Ok(fresh)
    }

    /// Forgets `rejected` if it is still the held key.
    ///
    /// A key that was already replaced by a refresh is left alone.
    pub async fn invalidate(&self, rejected: &Credential) {
        let mut current = self.current.lock().await;
        if current.as_ref() == Some(rejected) {
            tracing::debug!("dropping rejected session key");
            *current = None;
        }
    }

    /// Forgets whatever key is held.
    pub async fn clear(&self) {
        *self.current.lock().await = None;
    }

    /// Snapshot of the held key, without verifying it.
    pub async fn current(&self) -> Option<Credential> {
        self.current.lock().await.clone()
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager").finish_non_exhaustive()
    }
}

fn extraction_failed(err: PerchanceError) -> PerchanceError {
    match err {
        PerchanceError::Connection(_) => err,
        other => PerchanceError::Connection(format!("key extraction failed: {other}")),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub(crate) const KEY_A: &str =
        "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    pub(crate) const KEY_B: &str =
        "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    /// Source that hands out scripted keys and a fixed verification result.
    pub(crate) struct ScriptedSource {
        keys: std::sync::Mutex<Vec<Result<String>>>,
        verdict: Verification,
        pub(crate) fetches: Arc<AtomicUsize>,
        pub(crate) verifies: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        pub(crate) fn new(verdict: Verification, keys: Vec<Result<String>>) -> Self {
            let mut keys = keys;
            keys.reverse();
            Self {
                keys: std::sync::Mutex::new(keys),
                verdict,
                fetches: Arc::new(AtomicUsize::new(0)),
                verifies: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl CredentialSource for ScriptedSource {
        async fn fetch(&self) -> Result<Credential> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let next = self
                .keys
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(PerchanceError::Connection("no more keys".into())));
            Credential::new(next?)
        }

        async fn verify(&self, _key: &Credential) -> Verification {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            self.verdict
        }
    }

    #[tokio::test]
    async fn test_extracts_when_no_key_held() {
        let source = ScriptedSource::new(Verification::Valid, vec![Ok(KEY_A.into())]);
        let fetches = source.fetches.clone();
        let verifies = source.verifies.clone();
        let manager = CredentialManager::new(source);

        let key = manager.ensure_valid().await.unwrap();
        assert_eq!(key.as_str(), KEY_A);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(verifies.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_key_is_never_re_extracted() {
        let source = ScriptedSource::new(Verification::Valid, vec![]);
        let fetches = source.fetches.clone();
        let manager =
            CredentialManager::with_credential(source, Credential::new(KEY_A).unwrap());

        for _ in 0..3 {
            assert_eq!(manager.ensure_valid().await.unwrap().as_str(), KEY_A);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_call_reuses_extracted_key() {
        let source = ScriptedSource::new(Verification::Valid, vec![Ok(KEY_A.into())]);
        let fetches = source.fetches.clone();
        let manager = CredentialManager::new(source);

        manager.ensure_valid().await.unwrap();
        manager.ensure_valid().await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_key_refreshes_exactly_once() {
        let source = ScriptedSource::new(
            Verification::Invalid,
            vec![Ok(KEY_B.into()), Ok(KEY_A.into())],
        );
        let fetches = source.fetches.clone();
        let manager =
            CredentialManager::with_credential(source, Credential::new(KEY_A).unwrap());

        let key = manager.ensure_valid().await.unwrap();
        assert_eq!(key.as_str(), KEY_B);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(manager.current().await.unwrap().as_str(), KEY_B);
    }

    #[tokio::test]
    async fn test_unreachable_verifier_forces_refresh() {
        let source = ScriptedSource::new(Verification::Unreachable, vec![Ok(KEY_B.into())]);
        let fetches = source.fetches.clone();
        let manager =
            CredentialManager::with_credential(source, Credential::new(KEY_A).unwrap());

        assert_eq!(manager.ensure_valid().await.unwrap().as_str(), KEY_B);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_connection_error() {
        let source = ScriptedSource::new(
            Verification::Valid,
            vec![Err(PerchanceError::Configuration("no helper".into()))],
        );
        let fetches = source.fetches.clone();
        let manager = CredentialManager::new(source);

        let err = manager.ensure_valid().await.unwrap_err();
        assert!(matches!(err, PerchanceError::Connection(_)));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(manager.current().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_extracted_key_is_rejected() {
        let source = ScriptedSource::new(Verification::Valid, vec![Ok(String::new())]);
        let manager = CredentialManager::new(source);

        let err = manager.ensure_valid().await.unwrap_err();
        assert!(matches!(err, PerchanceError::Connection(_)));
        assert!(manager.current().await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_only_drops_matching_key() {
        let source = ScriptedSource::new(Verification::Valid, vec![]);
        let manager =
            CredentialManager::with_credential(source, Credential::new(KEY_A).unwrap());

        manager.invalidate(&Credential::new(KEY_B).unwrap()).await;
        assert!(manager.current().await.is_some());

        manager.invalidate(&Credential::new(KEY_A).unwrap()).await;
        assert!(manager.current().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_extraction() {
        let source = ScriptedSource::new(Verification::Valid, vec![Ok(KEY_A.into())]);
        let fetches = source.fetches.clone();
        let manager = Arc::new(CredentialManager::new(source));

        let (a, b) = tokio::join!(manager.ensure_valid(), manager.ensure_valid());
        assert_eq!(a.unwrap().as_str(), KEY_A);
        assert_eq!(b.unwrap().as_str(), KEY_A);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
