// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema defining the shared workflow state
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StateSchema {
    /// Field definitions
    #[serde(flatten)]
    pub fields: HashMap<String, StateFieldDef>,
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateFieldDef {
    /// Type of the field
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Merge policy applied when a node update touches the field
    #[serde(default)]
    pub reducer: ReducerType,
    /// Default value
    pub default: Option<serde_json::Value>,
}

/// Supported field types
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

/// Reducer types for merging node updates into state
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReducerType {
    /// Replace the value (default)
    #[default]
    Overwrite,
    /// Append to array
    Append,
    /// Keep maximum value
    Max,
    /// Keep minimum value
    Min,
    /// Shallow merge of object keys, later keys win
    Merge,
    /// Shallow merge that ignores null attributes in the update, so partial
    /// reports from parallel steps never erase each other
    MergeNonNull,
}

impl StateSchema {
    /// Add a field definition, builder style
    pub fn field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        reducer: ReducerType,
        default: Option<serde_json::Value>,
    ) -> Self {
        self.fields.insert(
            name.into(),
            StateFieldDef {
                field_type,
                reducer,
                default,
            },
        );
        self
    }
}
