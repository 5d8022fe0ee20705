//! Key extractors: ways of obtaining a fresh session key.
//!
//! Perchance hands out keys only to a real browser that has clicked the
//! generate button. The browser automation itself lives outside this crate;
//! [`CommandKeyExtractor`] runs such a helper and watches what it prints.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::credential::key::find_user_key;
use crate::deadline::DeadlineGuard;
use crate::error::{PerchanceError, Result};

/// Default env var read by [`EnvKeyExtractor`].
pub const USER_KEY_ENV: &str = "PERCHANCE_USER_KEY";

/// Env var naming the helper program for [`CommandKeyExtractor`].
pub const KEY_COMMAND_ENV: &str = "PERCHANCE_KEY_COMMAND";

/// Produces a candidate session key.
#[async_trait]
pub trait KeyExtractor: Send + Sync {
    /// Obtains a new key, or fails after a bounded wait.
    async fn extract(&self) -> Result<String>;
}

#[async_trait]
impl<T: KeyExtractor + ?Sized> KeyExtractor for Box<T> {
    async fn extract(&self) -> Result<String> {
        (**self).extract().await
    }
}

/// Picks an extractor from the environment.
///
/// `PERCHANCE_USER_KEY` wins over `PERCHANCE_KEY_COMMAND`; with neither set
/// there is no way to obtain a key and a configuration error is returned.
pub fn default_extractor() -> Result<Box<dyn KeyExtractor>> {
    if std::env::var(USER_KEY_ENV).is_ok_and(|v| !v.trim().is_empty()) {
        return Ok(Box::new(EnvKeyExtractor::new()));
    }
    if std::env::var(KEY_COMMAND_ENV).is_ok() {
        return Ok(Box::new(CommandKeyExtractor::from_env()?));
    }
    Err(PerchanceError::Configuration(format!(
        "no session key source: set {USER_KEY_ENV} or {KEY_COMMAND_ENV}, or pass a key extractor"
    )))
}

/// Returns a fixed key.
#[derive(Clone)]
pub struct StaticKeyExtractor {
    key: String,
}

impl StaticKeyExtractor {
    /// Creates an extractor that always yields `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl std::fmt::Debug for StaticKeyExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeyExtractor").finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyExtractor for StaticKeyExtractor {
    async fn extract(&self) -> Result<String> {
        Ok(self.key.clone())
    }
}

/// Reads the key from an environment variable on every extraction.
#[derive(Debug, Clone)]
pub struct EnvKeyExtractor {
    var: String,
}

impl EnvKeyExtractor {
    /// Reads `PERCHANCE_USER_KEY`.
    pub fn new() -> Self {
        Self::from_var(USER_KEY_ENV)
    }

    /// Reads the given variable.
    pub fn from_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvKeyExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyExtractor for EnvKeyExtractor {
    async fn extract(&self) -> Result<String> {
        std::env::var(&self.var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| PerchanceError::Connection(format!("{} not set", self.var)))
    }
}

/// Runs an external browser-automation helper and scans its stdout for a key.
///
/// The helper is expected to load the generator page, press generate and print
/// the observed request URLs (or the `verifyUser` response body). The first
/// line carrying a 64-character hex key wins, after which the helper is killed.
#[derive(Debug, Clone)]
pub struct CommandKeyExtractor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandKeyExtractor {
    /// Runs `program` with no arguments and a 20 second budget.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(20),
        }
    }

    /// Uses the program named by `PERCHANCE_KEY_COMMAND`, split on whitespace.
    pub fn from_env() -> Result<Self> {
        let raw = std::env::var(KEY_COMMAND_ENV).map_err(|_| {
            PerchanceError::Configuration(format!("{KEY_COMMAND_ENV} not set"))
        })?;
        let mut parts = raw.split_whitespace().map(String::from);
        let program = parts.next().ok_or_else(|| {
            PerchanceError::Configuration(format!("{KEY_COMMAND_ENV} is empty"))
        })?;
        Ok(Self::new(program).args(parts))
    }

    /// Appends arguments passed to the helper.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets how long to wait for a key before giving up.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl KeyExtractor for CommandKeyExtractor {
    async fn extract(&self) -> Result<String> {
        tracing::debug!(program = %self.program, "launching key extraction helper");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PerchanceError::Connection(format!("failed to launch {}: {e}", self.program))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            PerchanceError::Connection("key extraction helper has no stdout".into())
        })?;
        let mut lines = BufReader::new(stdout).lines();

        let guard = DeadlineGuard::new(self.timeout, |budget| {
            PerchanceError::Connection(format!("no session key observed within {budget:?}"))
        });

        let key = loop {
            guard.tick()?;

            let line = match tokio::time::timeout(guard.remaining(), lines.next_line()).await {
                Ok(line) => line?,
                // Let the next tick report the expiry.
                Err(_) => continue,
            };

            match line {
                Some(line) => {
                    if let Some(key) = find_user_key(&line) {
                        break key.to_string();
                    }
                }
                None => {
                    return Err(PerchanceError::Connection(
                        "key extraction helper exited without printing a key".into(),
                    ));
                }
            }
        };

        if let Err(e) = child.kill().await {
            tracing::debug!(error = %e, "key extraction helper already exited");
        }

        Ok(key)
    }
}
