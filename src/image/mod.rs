//! Image generation module.

mod artifact;
mod generator;
mod provider;
mod types;

pub use artifact::ImageArtifact;
pub use generator::{ImageGenerator, ImageGeneratorBuilder, BASE_URL_ENV, DEFAULT_BASE_URL};
pub use provider::{ImageProvider, ImageProviderExt};
pub use types::{GenerationParams, ImageFormat, ImageRequest, Shape};
