//! Session key with redacted Debug output.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use std::sync::LazyLock;
use zeroize::Zeroize;

use crate::error::{PerchanceError, Result};

static USER_KEY_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"userKey=([a-f\d]{64})").expect("valid regex"));
static USER_KEY_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""userKey"\s*:\s*"([a-f\d]{64})""#).expect("valid regex"));
static BARE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f\d]{64}$").expect("valid regex"));

/// A Perchance session key.
///
/// Never empty. Cloning is cheap; the key is replaced rather than mutated when
/// it is refreshed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    inner: Arc<SecretString>,
}

impl Credential {
    /// Wraps a key, rejecting empty or whitespace-only values.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let mut key: String = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            key.zeroize();
            return Err(PerchanceError::Configuration("session key is empty".into()));
        }
        let value = trimmed.to_string();
        key.zeroize();
        Ok(Self {
            inner: Arc::new(SecretString(value)),
        })
    }

    /// The raw key, for sending to the server only.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.inner.0
    }

    /// Key length (safe to log).
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.0.len()
    }

    /// Whether the key is empty. Never true for a constructed key.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([REDACTED])")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED USER KEY]")
    }
}

#[derive(PartialEq, Eq)]
struct SecretString(String);

impl Drop for SecretString {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Finds a 64-character lowercase hex user key in captured traffic.
///
/// Accepts a `userKey=` query parameter, a JSON `"userKey": "..."` member, or a
/// line consisting of the bare key.
pub fn find_user_key(text: &str) -> Option<&str> {
    if let Some(caps) = USER_KEY_PARAM.captures(text) {
        return caps.get(1).map(|m| m.as_str());
    }
    if let Some(caps) = USER_KEY_JSON.captures(text) {
        return caps.get(1).map(|m| m.as_str());
    }
    text.lines()
        .map(str::trim)
        .find(|line| BARE_KEY.is_match(line))
}
