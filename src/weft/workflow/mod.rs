// SPDX-License-Identifier: MIT

//! Layered workflow specs compiled into execution graphs
//!
//! spec → resolve against the registry → normalize → deduplicate →
//! assemble on a [`graph::GraphBuilder`] → compiled graph

pub mod assembler;
pub mod builder;
pub mod condition;
pub mod dedup;
pub mod diff;
pub mod graph;
pub mod loader;
pub mod node;
pub mod normalizer;
pub mod registry;
pub mod spec;
pub mod state;
pub mod types;

pub use builder::Builder;
pub use graph::{CompiledGraph, StateGraph, END, START};
pub use node::{step_fn, RoutingCondition, StepFn};
pub use registry::FunctionRegistry;
pub use spec::{Layer, RouteMap, RouteTarget, Spec};
pub use state::{StateUpdate, WorkflowState};
