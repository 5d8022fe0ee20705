//! Text provider trait.

use crate::error::Result;
use crate::text::stream::TextStream;
use crate::text::types::TextRequest;
use async_trait::async_trait;

/// Trait for streaming text generators.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Starts a generation and returns its fragment stream.
    ///
    /// Failures reported by the server before streaming begins surface here,
    /// never as stream items.
    async fn generate(&self, request: &TextRequest) -> Result<TextStream>;

    /// Makes sure a usable session key is held, extracting one if needed.
    async fn refresh(&self) -> Result<()>;
}
