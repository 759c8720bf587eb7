// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::resources::Resources;
use super::schema::{ReducerType, StateSchema};
use super::update::StateUpdate;

/// Shared state threaded through every node of one workflow invocation
///
/// Fields are JSON values merged through per-field reducers. Live handles
/// (model clients and the like) live in [`Resources`] and are shared by
/// reference between the copies handed to each node.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    fields: Map<String, Value>,
    reducers: Arc<HashMap<String, ReducerType>>,
    resources: Resources,
}

impl WorkflowState {
    /// Create a new WorkflowState from a schema
    pub fn new(schema: &StateSchema) -> Self {
        let mut fields = Map::new();
        let mut reducers = HashMap::new();

        let mut names: Vec<&String> = schema.fields.keys().collect();
        names.sort();
        for name in names {
            let def = &schema.fields[name];
            if let Some(default) = &def.default {
                fields.insert(name.clone(), default.clone());
            }
            reducers.insert(name.clone(), def.reducer);
        }

        Self {
            fields,
            reducers: Arc::new(reducers),
            resources: Resources::default(),
        }
    }

    /// Create an empty WorkflowState
    pub fn empty() -> Self {
        Self::default()
    }

    /// Overlay the fields of a JSON object onto this state, bypassing reducers
    pub fn with_values(mut self, values: Map<String, Value>) -> Self {
        for (key, value) in values {
            self.fields.insert(key, value);
        }
        self
    }

    /// Attach a live resource, builder style
    pub fn with_resource<T>(mut self, name: impl Into<String>, value: T) -> Self
    where
        T: std::any::Any + Send + Sync,
    {
        self.resources.insert(name, value);
        self
    }

    /// Assign a field directly, the way a node mutates its own copy
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Update a field using the appropriate reducer
    pub fn update(&mut self, key: &str, value: Value) {
        let reducer = self
            .reducers
            .get(key)
            .copied()
            .unwrap_or(ReducerType::Overwrite);

        match reducer {
            ReducerType::Overwrite => {
                self.fields.insert(key.to_string(), value);
            }
            ReducerType::Append => {
                let arr = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Array(vec![]));
                if let Value::Array(a) = arr {
                    match value {
                        Value::Array(new_items) => a.extend(new_items),
                        other => a.push(other),
                    }
                }
            }
            ReducerType::Max => {
                let current = self.fields.get(key).and_then(Value::as_f64);
                if let Some(new) = value.as_f64() {
                    if current.map_or(true, |c| new > c) {
                        self.fields.insert(key.to_string(), value);
                    }
                }
            }
            ReducerType::Min => {
                let current = self.fields.get(key).and_then(Value::as_f64);
                if let Some(new) = value.as_f64() {
                    if current.map_or(true, |c| new < c) {
                        self.fields.insert(key.to_string(), value);
                    }
                }
            }
            ReducerType::Merge | ReducerType::MergeNonNull => {
                let skip_null = reducer == ReducerType::MergeNonNull;
                let current = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Object(Map::new()));
                match (current, value) {
                    (Value::Object(current_obj), Value::Object(new_obj)) => {
                        for (k, v) in new_obj {
                            if skip_null && v.is_null() {
                                continue;
                            }
                            current_obj.insert(k, v);
                        }
                    }
                    (_, Value::Null) if skip_null => {}
                    (slot, other) => *slot = other,
                }
            }
        }
    }

    /// Merge a node's update into state, field by field, through the reducers
    pub fn apply(&mut self, update: &StateUpdate) {
        for (key, value) in update.iter() {
            self.update(key, value.clone());
        }
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field as a string slice
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Get a nested field value using dot notation (e.g., "report.summary")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Borrow the field map
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Convert state fields to a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Get all field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }
}
