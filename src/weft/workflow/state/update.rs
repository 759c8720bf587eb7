// SPDX-License-Identifier: MIT

//! Partial state updates returned by nodes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Changeset a node hands back to the runtime: top-level field → new value
///
/// Build one explicitly with [`StateUpdate::set`], or let the state-diff
/// wrapper derive it from in-place mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateUpdate {
    fields: Map<String, Value>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, builder style
    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Map<String, Value>> for StateUpdate {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_keeps_insertion_order() {
        let update = StateUpdate::new().set("b", json!(1)).set("a", json!(2));
        let keys: Vec<&String> = update.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(update.len(), 2);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let update = StateUpdate::new().set("x", json!(2));
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"x": 2}));
    }
}
