// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `StateSchema` - declares fields, defaults and merge policies
//! - `WorkflowState` - runtime state storage with reducer support
//! - `StateUpdate` - the changeset a node returns
//! - `Resources` - live handles shared by reference, never diffed

mod resources;
mod schema;
mod store;
mod update;

pub use resources::Resources;
pub use schema::{FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::WorkflowState;
pub use update::StateUpdate;
