//! The composed state a provider/action/evaluator/model call sees:
//! `{values, data, text}` plus whatever the composer aggregates.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// What a single provider contributes for one message.
#[derive(Debug, Clone, Default)]
pub struct ProviderOutput {
    pub values: Map<String, Value>,
    pub data: Map<String, Value>,
    pub text: String,
}

/// The aggregated result of `compose_state`.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub values: Map<String, Value>,
    /// `data.providers` holds each provider's raw `data` by name; other
    /// top-level keys are reserved for composer bookkeeping.
    pub data: Map<String, Value>,
    pub text: String,
}

impl State {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn provider_data(&self) -> HashMap<String, Value> {
        self.data
            .get("providers")
            .and_then(|v| v.as_object())
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}
