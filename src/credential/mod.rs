//! Session key lifecycle: extraction, verification and refresh.

mod extractor;
mod key;
mod manager;
mod verifier;

pub use extractor::{
    default_extractor, CommandKeyExtractor, EnvKeyExtractor, KeyExtractor, StaticKeyExtractor,
    KEY_COMMAND_ENV, USER_KEY_ENV,
};
pub use key::{find_user_key, Credential};
pub use manager::{CredentialManager, CredentialSource, ProviderCredentials};
pub use verifier::{HttpKeyVerifier, KeyVerifier, Verification};

#[cfg(test)]
pub(crate) use manager::tests as test_support;
