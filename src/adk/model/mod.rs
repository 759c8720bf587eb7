// SPDX-License-Identifier: MIT

//! Model module - chat-completion client seam used by business steps
//!
//! The compiler never talks to a model itself; steps fetch a
//! [`ChatModel`] from the state's resources. Implementations:
//! - [openai] - any OpenAI-compatible `/chat/completions` endpoint

pub mod openai;

use crate::adk::error::WeftError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Core trait for chat-completion clients
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the conversation and return the reply text
    async fn chat(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
    ) -> Result<String, WeftError>;
}
