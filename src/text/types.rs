//! Core types for text generation.

use serde::{Deserialize, Serialize};

/// A request to generate text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRequest {
    /// Instruction describing the text to write.
    pub instruction: String,
    /// Text the output should begin with.
    pub start_with: Option<String>,
}

impl TextRequest {
    /// Creates a new request with the given instruction.
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            start_with: None,
        }
    }

    /// Sets the starting fragment.
    pub fn with_start(mut self, start_with: impl Into<String>) -> Self {
        self.start_with = Some(start_with.into());
        self
    }
}
