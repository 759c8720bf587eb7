// SPDX-License-Identifier: MIT

//! YAML schema types for workflow definition files
//!
//! ```yaml
//! name: interview
//! description: Screen a candidate
//! state:
//!   notes: { type: array, reducer: append }
//! nodes:
//!   - transcribe
//!   - [resume_analysis, qa_analysis]
//!   - { step: check, condition: early_stop }
//!   - report
//! routes:
//!   early_stop:
//!     cases:
//!       - when: "score < 2"
//!         outcome: END
//!     default: report
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::weft::workflow::spec::Spec;
use crate::weft::workflow::state::{StateSchema, WorkflowState};

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Field types, reducers and defaults of the workflow state
    pub state: Option<StateSchema>,
    /// The layered spec
    pub nodes: Spec,
    /// Declarative routing conditions, by name
    #[serde(default)]
    pub routes: HashMap<String, RouteDefinition>,
    /// LLM-backed steps, by name
    #[serde(default)]
    pub prompts: HashMap<String, PromptDefinition>,
    #[serde(default)]
    pub model: ModelDefinition,
    /// Maximum supersteps per run
    pub recursion_limit: Option<usize>,
}

/// Ordered `when` cases of a declarative routing condition
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RouteDefinition {
    #[serde(default)]
    pub cases: Vec<RouteCase>,
    /// Outcome when no case matches; the run ends when absent
    pub default: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RouteCase {
    pub when: String,
    pub outcome: String,
}

/// A step that asks the chat model and stores the reply
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptDefinition {
    /// User prompt with `{field}` placeholders
    pub template: String,
    /// State field receiving the reply
    pub output: String,
    pub system: Option<String>,
}

/// Chat model settings for prompt steps
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ModelDefinition {
    pub model_name: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl WorkflowDefinition {
    /// Fresh state carrying the declared field defaults and reducers
    pub fn initial_state(&self) -> WorkflowState {
        self.state
            .as_ref()
            .map(WorkflowState::new)
            .unwrap_or_default()
    }
}
