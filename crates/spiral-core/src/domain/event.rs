//! Input events submitted to the pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One unit of input: text plus contextual metadata.
///
/// `context` is ordered so that digests and serialized forms are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub text: String,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl Event {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: BTreeMap::new(),
        }
    }

    /// Add a context entry, replacing any previous value for `key`.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// String value of a context entry, if present and a string.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(|v| v.as_str())
    }
}
