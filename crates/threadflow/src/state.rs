// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Open associative graph state.
//!
//! A [`State`] is a schema-less map from field name to JSON value. Fields
//! accumulate across a run via shallow patch-merge: a node returns a partial
//! update, and [`State::merge`] overwrites exactly the keys present in the
//! patch while leaving every other key untouched. Nested values are replaced
//! wholesale; there is no deep merge.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Mutable shared state threaded through a graph run.
///
/// Partially populated by design: not all fields need be present at any
/// time, and the engine enforces no schema beyond the field names that node
/// and routing logic agree on.
///
/// # Example
///
/// ```rust
/// use threadflow::State;
/// use serde_json::json;
///
/// let mut state = State::new().with("user_input", "/go");
/// let patch = State::new().with("intent", "command");
/// state.merge(&patch);
///
/// assert_eq!(state.get_str("user_input"), Some("/go"));
/// assert_eq!(state.get("intent"), Some(&json!("command")));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    fields: BTreeMap<String, Value>,
}

impl State {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shallow-merge a patch into this state.
    ///
    /// Sets exactly the keys present in `patch`, overwriting existing values;
    /// all other keys are preserved unchanged.
    pub fn merge(&mut self, patch: &State) {
        for (key, value) in &patch.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Get a field value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field as a string slice, if present and a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Get a field as a bool, if present and a bool.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    /// Whether a field is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Number of populated fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over populated field names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterate over populated fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for State {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_sets_exactly_patch_keys() {
        let mut state = State::new().with("a", 1).with("b", "old");
        let patch = State::new().with("b", "new").with("c", true);

        state.merge(&patch);

        assert_eq!(state.get("a"), Some(&json!(1)));
        assert_eq!(state.get("b"), Some(&json!("new")));
        assert_eq!(state.get_bool("c"), Some(true));
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_merge_empty_patch_is_identity() {
        let mut state = State::new().with("a", 1);
        let before = state.clone();

        state.merge(&State::new());

        assert_eq!(state, before);
    }

    #[test]
    fn test_merge_is_shallow() {
        // Nested structures are replaced wholesale, not deep-merged.
        let mut state = State::new().with("cart", json!({"apples": 2, "pears": 1}));
        let patch = State::new().with("cart", json!({"apples": 3}));

        state.merge(&patch);

        assert_eq!(state.get("cart"), Some(&json!({"apples": 3})));
    }

    #[test]
    fn test_field_persists_until_overwritten() {
        let mut state = State::new();
        state.merge(&State::new().with("intent", "command"));
        state.merge(&State::new().with("llm_output", "ok"));

        assert_eq!(state.get_str("intent"), Some("command"));
    }

    #[test]
    fn test_serde_round_trip_preserves_value_types() {
        let state = State::new()
            .with("s", "text")
            .with("n", 42)
            .with("f", 1.5)
            .with("b", false)
            .with("v", json!([1, "two", null]));

        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: State = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, state);
    }

    #[test]
    fn test_from_iterator() {
        let state: State = vec![("x", json!(1)), ("y", json!(2))].into_iter().collect();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("y"), Some(&json!(2)));
    }
}
