// SPDX-License-Identifier: MIT

//! Business-logic seams: steps and routing conditions
//!
//! A step may either return an explicit [`StateUpdate`] or simply mutate the
//! state it is handed and return `None`; the state-diff wrapper recovers the
//! changed fields in the second case.

use crate::adk::error::BoxError;
use crate::weft::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome label that ends the workflow from a conditional node
pub const END: &str = "__end__";

/// Result of running one step
pub type StepResult = Result<Option<StateUpdate>, BoxError>;

/// One unit of business logic addressed by a step name
#[async_trait]
pub trait StepFn: Send + Sync {
    /// Run against this node's copy of the shared state
    async fn run(&self, state: &mut WorkflowState) -> StepResult;
}

/// Decides at runtime which branch a conditional node takes
pub trait RoutingCondition: Send + Sync {
    /// Return an outcome label from the node's route map, or [`END`]
    fn route(&self, state: &WorkflowState) -> Result<String, BoxError>;
}

impl<F> RoutingCondition for F
where
    F: Fn(&WorkflowState) -> String + Send + Sync,
{
    fn route(&self, state: &WorkflowState) -> Result<String, BoxError> {
        Ok(self(state))
    }
}

/// Adapter turning a synchronous closure into a [`StepFn`]
pub struct SyncStep<F> {
    func: F,
}

#[async_trait]
impl<F> StepFn for SyncStep<F>
where
    F: Fn(&mut WorkflowState) -> StepResult + Send + Sync,
{
    async fn run(&self, state: &mut WorkflowState) -> StepResult {
        (self.func)(state)
    }
}

/// Wrap a synchronous closure as a shareable step
pub fn step_fn<F>(func: F) -> Arc<dyn StepFn>
where
    F: Fn(&mut WorkflowState) -> StepResult + Send + Sync + 'static,
{
    Arc::new(SyncStep { func })
}

/// Step that does nothing; used for synchronizer and continuation nodes
pub struct NoopStep;

#[async_trait]
impl StepFn for NoopStep {
    async fn run(&self, _state: &mut WorkflowState) -> StepResult {
        Ok(None)
    }
}

/// Built-in early-stop condition: ends the workflow once `flag_field` is
/// `true`, otherwise yields `continue_outcome`
pub fn early_stop(
    flag_field: impl Into<String>,
    continue_outcome: impl Into<String>,
) -> Arc<dyn RoutingCondition> {
    let flag_field = flag_field.into();
    let continue_outcome = continue_outcome.into();
    Arc::new(move |state: &WorkflowState| {
        let stop = state
            .get(&flag_field)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if stop {
            END.to_string()
        } else {
            continue_outcome.clone()
        }
    })
}
