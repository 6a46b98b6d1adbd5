//! Answer generation: prompt assembly and citation tracking

pub mod citation;
pub mod prompt;

pub use citation::cited_sources;
pub use prompt::{decode_query_image, PromptBuilder};

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One piece of a turn's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    /// Base64 image with its media type (e.g. `image/png`)
    Image { media_type: String, data: String },
}

impl Part {
    pub fn text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            Part::Image { .. } => None,
        }
    }
}

/// A single message in the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }
}

/// Backend-neutral generation payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// System instruction
    pub system: String,
    /// Conversation, oldest first
    pub turns: Vec<Turn>,
}

impl GenerationRequest {
    /// All text parts joined, for logging and tests
    pub fn text(&self) -> String {
        self.turns
            .iter()
            .flat_map(|t| t.parts.iter().filter_map(Part::text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Number of image parts across all turns
    pub fn image_count(&self) -> usize {
        self.turns
            .iter()
            .flat_map(|t| &t.parts)
            .filter(|p| matches!(p, Part::Image { .. }))
            .count()
    }
}
