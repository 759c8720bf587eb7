// SPDX-License-Identifier: MIT

//! Workflow compiler and ready-made steps

pub mod steps;
pub mod workflow;
