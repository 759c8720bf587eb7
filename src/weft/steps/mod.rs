// SPDX-License-Identifier: MIT

//! Ready-made business steps

mod llm;

pub use llm::{LlmStep, MODEL_RESOURCE};
