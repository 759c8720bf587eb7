// SPDX-License-Identifier: MIT

//! Prompt step backed by a chat model

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::adk::error::WeftError;
use crate::adk::model::{ChatModel, GenerationConfig, Message};
use crate::weft::workflow::node::{StepFn, StepResult};
use crate::weft::workflow::state::{StateUpdate, WorkflowState};

/// Resource name under which an `Arc<dyn ChatModel>` is expected
pub const MODEL_RESOURCE: &str = "chat_model";

/// Renders a `{field}` template from state, asks the chat model and stores
/// the reply in `output`
#[derive(Debug, Clone)]
pub struct LlmStep {
    system: Option<String>,
    template: String,
    output: String,
    config: GenerationConfig,
}

impl LlmStep {
    pub fn new(template: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            system: None,
            template: template.into(),
            output: output.into(),
            config: GenerationConfig::default(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Substitute `{path}` placeholders with state values. Strings are
    /// inserted verbatim, other values as JSON; unknown paths stay as written.
    pub fn render(&self, state: &WorkflowState) -> String {
        let mut rendered = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}');
            let path = close.map(|end| &after[..end]).filter(|p| is_path(p));

            match (path, close) {
                (Some(path), Some(end)) => {
                    match state.get_path(path) {
                        Some(Value::String(s)) => rendered.push_str(s),
                        Some(value) => rendered.push_str(&value.to_string()),
                        None => {
                            log::warn!("Prompt placeholder '{{{}}}' has no value in state", path);
                            rendered.push_str(&rest[open..open + end + 2]);
                        }
                    }
                    rest = &after[end + 1..];
                }
                _ => {
                    rendered.push('{');
                    rest = after;
                }
            }
        }

        rendered.push_str(rest);
        rendered
    }
}

fn is_path(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

#[async_trait]
impl StepFn for LlmStep {
    async fn run(&self, state: &mut WorkflowState) -> StepResult {
        let model = state
            .resources()
            .get::<Arc<dyn ChatModel>>(MODEL_RESOURCE)
            .cloned()
            .ok_or_else(|| {
                WeftError::config(format!("no '{}' resource in workflow state", MODEL_RESOURCE))
            })?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(self.render(state)));

        let reply = model.chat(&messages, Some(&self.config)).await?;
        log::debug!("Model replied with {} chars for '{}'", reply.len(), self.output);

        Ok(Some(
            StateUpdate::new().set(self.output.clone(), Value::String(reply)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Echoes the last user message and records what it was sent
    struct EchoModel {
        seen: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn chat(
            &self,
            messages: &[Message],
            _config: Option<&GenerationConfig>,
        ) -> Result<String, WeftError> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            Ok(format!("echo: {}", messages.last().unwrap().content))
        }
    }

    fn state_with_model(model: Arc<EchoModel>) -> WorkflowState {
        let model: Arc<dyn ChatModel> = model;
        WorkflowState::empty().with_resource(MODEL_RESOURCE, model)
    }

    #[test]
    fn test_render_placeholders() {
        let step = LlmStep::new("Rate {name} ({profile.years} yrs): {missing} {not a path} {", "out");
        let mut state = WorkflowState::empty();
        state.set("name", json!("Ada"));
        state.set("profile", json!({"years": 7}));

        assert_eq!(
            step.render(&state),
            "Rate Ada (7 yrs): {missing} {not a path} {"
        );
    }

    #[tokio::test]
    async fn test_run_writes_reply_to_output() {
        let model = Arc::new(EchoModel {
            seen: Mutex::new(Vec::new()),
        });
        let mut state = state_with_model(model.clone());
        state.set("text", json!("long story"));

        let step = LlmStep::new("Summarize: {text}", "summary").with_system("Be brief.");
        let update = step.run(&mut state).await.unwrap().unwrap();

        assert_eq!(update.get("summary"), Some(&json!("echo: Summarize: long story")));
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0], Message::system("Be brief."));
        assert_eq!(seen[1], Message::user("Summarize: long story"));
    }

    #[tokio::test]
    async fn test_missing_model_is_an_error() {
        let step = LlmStep::new("hi", "out");
        let err = step.run(&mut WorkflowState::empty()).await.unwrap_err();
        assert!(err.to_string().contains(MODEL_RESOURCE));
    }
}
