//! Core types for image generation.

use crate::error::{PerchanceError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Encodings served by `/downloadTemporaryImage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG.
    Png,
    /// JPEG, the usual `fileExtension` for this generator.
    Jpeg,
    /// WebP.
    WebP,
}

impl ImageFormat {
    /// MIME type used when building data URLs.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Maps a server-reported `fileExtension`, with or without a dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Identifies downloaded bytes by their file signature.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match data {
            [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n', ..] => Some(Self::Png),
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::WebP),
            _ => None,
        }
    }
}

/// Output shape. Each maps to exactly one fixed resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// 512x768.
    Portrait,
    /// 512x512.
    #[default]
    Square,
    /// 768x512.
    Landscape,
}

impl Shape {
    /// All shapes, in declaration order.
    pub const ALL: [Shape; 3] = [Shape::Portrait, Shape::Square, Shape::Landscape];

    /// Width and height in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Portrait => (512, 768),
            Self::Square => (512, 512),
            Self::Landscape => (768, 512),
        }
    }

    /// Resolution string sent to the API (e.g. `"512x768"`).
    pub fn resolution(&self) -> &'static str {
        match self {
            Self::Portrait => "512x768",
            Self::Square => "512x512",
            Self::Landscape => "768x512",
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::Square => "square",
            Self::Landscape => "landscape",
        }
    }
}

impl FromStr for Shape {
    type Err = PerchanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(Self::Portrait),
            "square" => Ok(Self::Square),
            "landscape" => Ok(Self::Landscape),
            other => Err(PerchanceError::Configuration(format!(
                "invalid shape {other:?}: expected portrait, square or landscape"
            ))),
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to generate an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Image description.
    pub prompt: String,
    /// Things that should not appear in the image.
    pub negative_prompt: Option<String>,
    /// Generation seed; `-1` lets the server pick one.
    pub seed: i64,
    /// Output shape.
    pub shape: Shape,
    /// How closely to follow the prompt, nominally 1 to 30.
    pub guidance_scale: f32,
}

impl ImageRequest {
    /// Random seed.
    pub const RANDOM_SEED: i64 = -1;
    /// Guidance scale used when none is given.
    pub const DEFAULT_GUIDANCE_SCALE: f32 = 7.0;

    /// Creates a new square request with a random seed.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            seed: Self::RANDOM_SEED,
            shape: Shape::default(),
            guidance_scale: Self::DEFAULT_GUIDANCE_SCALE,
        }
    }

    /// Sets the negative prompt.
    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into());
        self
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the shape.
    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    /// Parses and sets the shape from its name.
    pub fn with_shape_name(self, shape: &str) -> Result<Self> {
        Ok(self.with_shape(shape.parse()?))
    }

    /// Sets the guidance scale.
    pub fn with_guidance_scale(mut self, scale: f32) -> Self {
        self.guidance_scale = scale;
        self
    }

    /// Checks the request locally, before anything is sent.
    pub fn validate(&self) -> Result<()> {
        if !self.guidance_scale.is_finite() {
            return Err(PerchanceError::Configuration(format!(
                "guidance scale must be finite, got {}",
                self.guidance_scale
            )));
        }
        Ok(())
    }
}

/// Parameters echoed back on a finished image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Prompt the image was generated from.
    pub prompt: String,
    /// Negative prompt, if any.
    pub negative_prompt: Option<String>,
    /// Seed sent with the request.
    pub seed: i64,
    /// Requested shape.
    pub shape: Shape,
    /// Guidance scale sent with the request.
    pub guidance_scale: f32,
}

impl From<&ImageRequest> for GenerationParams {
    fn from(req: &ImageRequest) -> Self {
        Self {
            prompt: req.prompt.clone(),
            negative_prompt: req.negative_prompt.clone(),
            seed: req.seed,
            shape: req.shape,
            guidance_scale: req.guidance_scale,
        }
    }
}
