//! Inference Client: Ollama API client for local LLM inference.
//!
//! This module handles all communication with the local model endpoint:
//! - Model listing and availability checks
//! - Streaming and non-streaming chat completions
//! - NDJSON stream parsing, including tool calls
//!
//! The client is stateless with respect to the conversation; callers own the
//! history and pass it on every request.

pub mod client;
pub mod errors;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::InferenceClient;
pub use errors::InferenceError;
pub use types::{
    ChatMessage, ModelDescriptor, Role, StreamChunk, StreamEvent, ToolDefinition, ToolInvocation,
};
