// SPDX-License-Identifier: MIT

//! State-diff wrapper - adapts a business step into a runtime node
//!
//! Steps may mutate the state they are handed instead of building a
//! changeset. The wrapper snapshots the fields beforehand and, when the step
//! returns no explicit update, reports the top-level fields that changed.
//! Removed fields and nested edits on an unchanged top-level value are not
//! reported.

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::adk::error::WorkflowError;
use crate::weft::workflow::graph::GraphNode;
use crate::weft::workflow::node::StepFn;
use crate::weft::workflow::state::{StateUpdate, WorkflowState};

/// A step registered under its unique graph id
pub struct StateDiff {
    node_id: String,
    step: Arc<dyn StepFn>,
}

impl StateDiff {
    pub fn new(node_id: impl Into<String>, step: Arc<dyn StepFn>) -> Self {
        Self {
            node_id: node_id.into(),
            step,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

#[async_trait]
impl GraphNode for StateDiff {
    async fn invoke(&self, mut state: WorkflowState) -> Result<StateUpdate, WorkflowError> {
        let before = state.fields().clone();

        log::debug!("Starting step {}", self.node_id);
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.step.run(&mut state))
            .catch_unwind()
            .await;
        log::debug!("Step {} finished in {:?}", self.node_id, started.elapsed());

        let result = outcome.map_err(|payload| {
            let message = panic_message(payload.as_ref());
            log::error!("Step {} panicked: {}", self.node_id, message);
            WorkflowError::NodePanicked {
                node: self.node_id.clone(),
                message,
            }
        })?;

        match result {
            Ok(Some(update)) if !update.is_empty() => Ok(update),
            Ok(_) => Ok(diff_fields(&before, state.fields())),
            Err(source) => {
                log::error!("Step {} failed: {}", self.node_id, source);
                Err(WorkflowError::NodeFailed {
                    node: self.node_id.clone(),
                    source,
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Top-level fields of `after` that are new or differ from `before`
pub fn diff_fields(before: &Map<String, Value>, after: &Map<String, Value>) -> StateUpdate {
    after
        .iter()
        .filter(|(key, value)| before.get(key.as_str()) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect::<Map<String, Value>>()
        .into()
}
