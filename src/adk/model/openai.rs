// SPDX-License-Identifier: MIT

//! OpenAI-compatible chat model
//!
//! Works against OpenAI itself and against the compatible endpoints that
//! Qwen (DashScope) and DeepSeek expose.

use super::{ChatModel, GenerationConfig, Message, Role};
use crate::adk::error::{ModelError, WeftError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;

/// Chat model speaking the `/chat/completions` protocol
pub struct OpenAiCompatModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl OpenAiCompatModel {
    /// Create a new model from the environment
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    /// Optionally uses `OPENAI_BASE_URL` for compatible endpoints.
    pub fn new(model_name: String) -> Result<Self, WeftError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing("OPENAI_API_KEY".to_string()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self::with_endpoint(model_name, api_key, base_url))
    }

    /// Create a model for an explicit endpoint
    pub fn with_endpoint(model_name: String, api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn message_to_json(message: &Message) -> serde_json::Value {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        json!({ "role": role, "content": message.content })
    }

    fn request_body(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
    ) -> serde_json::Value {
        let messages: Vec<serde_json::Value> =
            messages.iter().map(Self::message_to_json).collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
        }

        body
    }

    fn parse_response(response: &serde_json::Value) -> Result<String, ModelError> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".to_string()))?;

        choice["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ModelError::InvalidResponse("message has no text content".to_string()))
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    async fn chat(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
    ) -> Result<String, WeftError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(messages, config);

        log::debug!(
            "Chat request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(WeftError::api(&self.model_name, text));
        }

        let resp_json: serde_json::Value = resp.json().await?;
        log::debug!("Chat response: {}", resp_json);

        Ok(Self::parse_response(&resp_json)?)
    }
}
