// SPDX-License-Identifier: MIT

//! weft-rs: compiles terse layered workflow specs into wired execution graphs
//!
//! - [`adk`] - error types and collaborator seams (chat model)
//! - [`weft`] - the workflow compiler, state model and in-process runtime

pub mod adk;
pub mod weft;
