// SPDX-License-Identifier: MIT

//! Typed error handling for weft-rs
//!
//! Compile-time (configuration) failures and run-time (node/routing)
//! failures are kept in separate enums so callers can tell a broken
//! workflow definition apart from a failing step.

use thiserror::Error;

/// Boxed error used at user-code seams (step bodies, routing conditions)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for weft-rs
#[derive(Debug, Error)]
pub enum WeftError {
    /// API errors from external services (chat model endpoints)
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workflow could not be compiled
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// Workflow failed while running
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Chat model errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Fatal configuration errors raised while turning a spec into a graph.
/// These are never retried.
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    /// The spec has no layers
    #[error("Workflow spec is empty")]
    EmptySpec,

    /// A step name is not in the function registry
    #[error("Step '{0}' not found in registry")]
    UnknownStep(String),

    /// A routing name is not in the function registry
    #[error("Routing condition '{0}' not found in registry")]
    UnknownCondition(String),

    /// A conditional layer could not be interpreted
    #[error("Malformed conditional layer: {0}")]
    MalformedConditional(String),

    /// An edge references a node id that was never registered
    #[error("Edge references unregistered node '{0}'")]
    UnregisteredNode(String),

    /// The same node id was registered twice on one graph
    #[error("Node '{0}' is already registered")]
    DuplicateNode(String),

    /// A declarative route expression failed to parse
    #[error("Invalid route expression '{expr}': {message}")]
    InvalidExpression { expr: String, message: String },

    /// A declarative route can produce an outcome its layer does not map
    #[error("Routing condition '{condition}' on '{step}' can return '{outcome}', which has no route")]
    UnroutedOutcome {
        step: String,
        condition: String,
        outcome: String,
    },
}

/// Errors raised while a compiled workflow runs
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A node returned an error
    #[error("Node '{node}' failed: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: BoxError,
    },

    /// A node panicked
    #[error("Node '{node}' panicked: {message}")]
    NodePanicked { node: String, message: String },

    /// A routing condition returned a label absent from its outcome map
    #[error("Routing from '{node}' returned unknown outcome '{outcome}'")]
    UnknownOutcome { node: String, outcome: String },

    /// A routing condition itself failed
    #[error("Routing from '{node}' failed: {source}")]
    RoutingFailed {
        node: String,
        #[source]
        source: BoxError,
    },

    /// The run did not reach END within the superstep limit
    #[error("Recursion limit of {0} supersteps reached")]
    RecursionLimit(usize),
}

/// Chat model errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),
}

impl WeftError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl WorkflowError {
    /// Name of the graph node the failure is attributed to, if any
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::NodeFailed { node, .. }
            | Self::NodePanicked { node, .. }
            | Self::UnknownOutcome { node, .. }
            | Self::RoutingFailed { node, .. } => Some(node),
            Self::RecursionLimit(_) => None,
        }
    }
}
