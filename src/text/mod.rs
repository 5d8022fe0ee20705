//! Streaming text generation module.

mod generator;
mod provider;
mod stream;
mod types;

pub use generator::{TextGenerator, TextGeneratorBuilder, BASE_URL_ENV, DEFAULT_BASE_URL};
pub use provider::TextProvider;
pub use stream::TextStream;
pub use types::TextRequest;
