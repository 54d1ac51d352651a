//! Agent Core error types.

use thiserror::Error;

use crate::inference::InferenceError;

/// Errors that can occur during agent core operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model asked for a tool that is not in the registry.
    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    /// The tool's external call failed (network error or non-2xx).
    #[error("tool '{tool}' failed: {reason}")]
    ToolExecutionError { tool: String, reason: String },

    /// Tool call arguments don't match the tool's parameter schema.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// A tool spec failed validation while building the registry.
    #[error("invalid tool spec '{name}': {reason}")]
    InvalidToolSpec { name: String, reason: String },

    /// A completion stream is already in flight for this session.
    #[error("already processing a message; wait for it to finish or stop it")]
    StreamBusy,

    /// No model has been selected for the session.
    #[error("no model selected")]
    NoModelSelected,

    /// Reading or writing a saved session failed.
    #[error("persistence error for {path}: {reason}")]
    PersistenceError { path: String, reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },

    /// Error from the inference client.
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::SerializationError {
            reason: e.to_string(),
        }
    }
}
