//! Structured diagnostics accumulated across auth calls
//!
//! The Okta flow makes up to three calls per invocation; each response body
//! is merged into one map that is surfaced back to the caller. Merging is a
//! key-wise union: new keys are added, existing keys are overwritten, and
//! keys absent from the incoming response survive. The map is never replaced
//! wholesale.

use serde_json::{Map, Value};

/// Accumulated structured outcome data for one invocation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Map<String, Value>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a JSON response body into the accumulated map.
    ///
    /// Non-object values are ignored; the auth endpoints always return
    /// objects on success.
    pub fn merge(&mut self, response: Value) {
        if let Value::Object(fields) = response {
            for (key, value) in fields {
                self.entries.insert(key, value);
            }
        }
    }

    /// Look up a single accumulated value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The accumulated map as a JSON value, for the result surface.
    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.clone())
    }
}
