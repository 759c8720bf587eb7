// SPDX-License-Identifier: MIT

//! Shared building blocks: error types and the chat model seam

pub mod error;
pub mod model;
