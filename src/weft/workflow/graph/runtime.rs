// SPDX-License-Identifier: MIT

//! The graph-runtime API the assembler drives
//!
//! Any execution engine can sit behind [`GraphBuilder`]; the crate ships the
//! in-process [`super::StateGraph`].

use crate::adk::error::{CompileError, WorkflowError};
use crate::weft::workflow::node::RoutingCondition;
use crate::weft::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;
use std::sync::Arc;

pub use crate::weft::workflow::node::END;

/// Virtual source node wired to the first layer
pub const START: &str = "__start__";

/// Outcome label → node ids started for that outcome, in declaration order
pub type OutcomeMap = Vec<(String, Vec<String>)>;

/// A node as the runtime sees it: state copy in, changeset out
#[async_trait]
pub trait GraphNode: Send + Sync {
    async fn invoke(&self, state: WorkflowState) -> Result<StateUpdate, WorkflowError>;
}

/// Node and edge registration calls of a graph-execution runtime
pub trait GraphBuilder {
    /// Invocable form produced by [`GraphBuilder::compile`]
    type Compiled;

    /// Register a node under a unique id
    fn add_node(&mut self, id: &str, node: Arc<dyn GraphNode>) -> Result<(), CompileError>;

    /// Whether `id` has been registered
    fn has_node(&self, id: &str) -> bool;

    /// Add a plain edge; adding the same edge twice has no further effect
    fn add_edge(&mut self, source: &str, target: &str) -> Result<(), CompileError>;

    /// Route out of `source` by calling `condition` after it runs. The
    /// [`END`] outcome is always accepted.
    fn add_conditional_edges(
        &mut self,
        source: &str,
        condition: Arc<dyn RoutingCondition>,
        routes: OutcomeMap,
    ) -> Result<(), CompileError>;

    /// Freeze the graph into something that can be invoked
    fn compile(self) -> Result<Self::Compiled, CompileError>;
}
