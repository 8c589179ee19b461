// Action result and declaration shapes
//
// The executable side of an action (`validate`/`handler`) is a trait living
// in the core crate, since it needs live runtime access. What's captured
// here is the static, serializable shape a plugin declares and the
// contribution triple every action produces.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The triple every action produces. `values` merge into subsequent state;
/// `data` persists into a plan's working memory, addressable by step id.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default)]
    pub values: Map<String, Value>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn ok_with_values(values: Map<String, Value>) -> Self {
        Self {
            success: true,
            values,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Declared data dependencies used by the planner to reason about ordering
/// when a plan's actions aren't already sequenced by the model.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActionEffects {
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub modifies: Vec<String>,
}

/// A single turn within a multi-turn action example.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleTurn {
    pub name: String,
    pub text: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

pub type ActionExample = Vec<ExampleTurn>;

/// A summary of a registered action, as surfaced to the planner when it
/// prompts the model for a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    #[serde(default)]
    pub similes: Vec<String>,
    pub description: String,
    #[serde(default)]
    pub effects: ActionEffects,
}
