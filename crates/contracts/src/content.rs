// Content - the open record carried by every message and agent utterance

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An attachment referenced by a message (image, file, audio, ...).
///
/// The runtime treats attachments as opaque; transports define their shape
/// via `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The content of a message or agent utterance.
///
/// Fields beyond the ones named here are permitted and carried opaquely in
/// `extra`; the core never inspects them.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Content {
    #[serde(default)]
    pub text: Option<String>,

    /// The agent's private reasoning - never shown to the user, never
    /// persisted into a transport-facing response.
    #[serde(default)]
    pub thought: Option<String>,

    /// Ordered list of action names the agent intends to perform.
    #[serde(default)]
    pub actions: Vec<String>,

    /// Explicit provider inclusion list for this turn's composition.
    #[serde(default)]
    pub providers: Vec<String>,

    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub in_reply_to: Option<uuid::Uuid>,

    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Arbitrary additional fields, opaque to the core.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = Some(thought.into());
        self
    }

    /// `true` if the content names more than one action - the signal the
    /// runtime uses (alongside intent classification) to decide whether to
    /// engage the planner instead of single-action mode.
    pub fn names_multiple_actions(&self) -> bool {
        self.actions.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_constructor_sets_only_text() {
        let c = Content::text("hello");
        assert_eq!(c.text.as_deref(), Some("hello"));
        assert!(c.actions.is_empty());
    }

    #[test]
    fn names_multiple_actions() {
        let c = Content::text("x").with_action("A").with_action("B");
        assert!(c.names_multiple_actions());
        let single = Content::text("x").with_action("A");
        assert!(!single.names_multiple_actions());
    }

    #[test]
    fn round_trips_through_json_with_extra_fields() {
        let json = serde_json::json!({
            "text": "hi",
            "actions": ["REPLY"],
            "customField": "value",
        });
        let content: Content = serde_json::from_value(json).unwrap();
        assert_eq!(content.text.as_deref(), Some("hi"));
        assert_eq!(
            content.extra.get("customField").and_then(|v| v.as_str()),
            Some("value")
        );
    }
}
