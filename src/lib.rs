#![warn(missing_docs)]
//! Perchance - async client for the Perchance image and text generators.
//!
//! Both services authenticate with a browser-issued session key. The crate
//! obtains that key through a pluggable [`credential::KeyExtractor`],
//! verifies it, and refreshes it when the server starts rejecting it.
//!
//! # Quick Start - Images
//!
//! ```no_run
//! use perchance::{ImageGenerator, ImageProvider, ImageRequest, Shape};
//!
//! #[tokio::main]
//! async fn main() -> perchance::Result<()> {
//!     let generator = ImageGenerator::builder().build()?;
//!     let request = ImageRequest::new("a cat sitting on stairs").with_shape(Shape::Square);
//!     let image = generator.generate(&request).await?;
//!     image.save_default().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Quick Start - Text
//!
//! ```no_run
//! use futures::StreamExt;
//! use perchance::{TextGenerator, TextProvider, TextRequest};
//!
//! #[tokio::main]
//! async fn main() -> perchance::Result<()> {
//!     let generator = TextGenerator::builder().build()?;
//!     let mut stream = generator.generate(&TextRequest::new("Write a limerick")).await?;
//!     while let Some(fragment) = stream.next().await {
//!         print!("{}", fragment?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `image`: Image generation (default)
//! - `text`: Streaming text generation (default)
//! - `cli`: Command-line interface

mod error;

pub mod credential;
pub mod deadline;

#[cfg(feature = "image")]
pub mod image;

#[cfg(feature = "text")]
pub mod text;

// Re-export error types at crate root
pub use error::{ErrorKind, PerchanceError, Result};

pub use credential::{Credential, CredentialManager, KeyExtractor};

#[cfg(feature = "image")]
pub use image::{
    ImageArtifact, ImageFormat, ImageGenerator, ImageGeneratorBuilder, ImageProvider,
    ImageProviderExt, ImageRequest, Shape,
};

#[cfg(feature = "text")]
pub use text::{TextGenerator, TextGeneratorBuilder, TextProvider, TextRequest, TextStream};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::credential::{CredentialManager, KeyExtractor};
    pub use crate::error::{PerchanceError, Result};

    #[cfg(feature = "image")]
    pub use crate::image::{
        ImageArtifact, ImageGenerator, ImageProvider, ImageProviderExt, ImageRequest, Shape,
    };

    #[cfg(feature = "text")]
    pub use crate::text::{TextGenerator, TextProvider, TextRequest, TextStream};
}
