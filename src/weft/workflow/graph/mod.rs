// SPDX-License-Identifier: MIT

//! Graph runtime seam and the in-process runtime behind it

mod executor;
mod runtime;

pub use executor::{CompiledGraph, RunReport, StateGraph, DEFAULT_RECURSION_LIMIT};
pub use runtime::{GraphBuilder, GraphNode, OutcomeMap, END, START};
