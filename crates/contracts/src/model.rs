// Model type tags used to key model dispatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    TextSmall,
    TextLarge,
    TextEmbedding,
    TextReasoningLarge,
    Image,
    Transcription,
    Tts,
    ObjectExtraction,
    /// Escape hatch for plugin-defined model types not named above.
    Custom(String),
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::TextSmall => write!(f, "text-small"),
            ModelType::TextLarge => write!(f, "text-large"),
            ModelType::TextEmbedding => write!(f, "text-embedding"),
            ModelType::TextReasoningLarge => write!(f, "reasoning"),
            ModelType::Image => write!(f, "image"),
            ModelType::Transcription => write!(f, "transcription"),
            ModelType::Tts => write!(f, "tts"),
            ModelType::ObjectExtraction => write!(f, "object-extraction"),
            ModelType::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// A single invocation's observability record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInvocationLog {
    pub model_type: String,
    pub provider: String,
    pub duration_ms: u64,
    pub input_shape: String,
    pub output_shape: String,
    pub fallback_used: bool,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}
