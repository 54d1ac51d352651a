//! Shared types for the inference client.
//!
//! These mirror the Ollama `/api/chat` and `/api/tags` wire types, used for
//! both request building and response parsing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::InferenceError;

// ─── Conversation Types ──────────────────────────────────────────────────────

/// A single message in the conversation.
///
/// This is both the wire shape sent to `/api/chat` and the on-disk shape of a
/// saved session. Optional fields are skipped when `None` so plain messages
/// stay `{role, content}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Name of the tool that produced a `tool` message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Id of the invocation a `tool` message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Assistant messages may carry the tool call they requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Assistant message that requested `invocation`.
    pub fn assistant_tool_call(content: impl Into<String>, invocation: &ToolInvocation) -> Self {
        Self {
            tool_calls: Some(vec![WireToolCall::from(invocation)]),
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// Result of a tool invocation, fed back to the model.
    pub fn tool_result(invocation: &ToolInvocation, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(invocation.tool_name.clone()),
            tool_call_id: Some(invocation.id.clone()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A model as enumerated by `GET /api/tags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
}

// ─── Request Types ───────────────────────────────────────────────────────────

/// Tool definition sent in the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition within a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<&'a [ToolDefinition]>,
}

// ─── Tool Calls ──────────────────────────────────────────────────────────────

/// Tool call as it appears on the wire, inside `message.tool_calls`.
///
/// Ollama sends `arguments` as a JSON object; OpenAI-style servers send a
/// JSON-encoded string. Both are kept verbatim here and normalized by
/// [`ToolInvocation::try_from_wire`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub function: WireFunctionCall,
}

/// Function call details in a wire tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl From<&ToolInvocation> for WireToolCall {
    fn from(invocation: &ToolInvocation) -> Self {
        Self {
            id: Some(invocation.id.clone()),
            function: WireFunctionCall {
                name: invocation.tool_name.clone(),
                arguments: serde_json::Value::Object(invocation.arguments.clone()),
            },
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Unique id (generated when the server doesn't provide one).
    pub id: String,
    pub tool_name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolInvocation {
    /// Normalize a wire tool call into an invocation.
    pub fn try_from_wire(call: &WireToolCall) -> Result<Self, InferenceError> {
        let arguments = match &call.function.arguments {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            serde_json::Value::String(raw) if raw.trim().is_empty() => serde_json::Map::new(),
            serde_json::Value::String(raw) => {
                match serde_json::from_str::<serde_json::Value>(raw) {
                    Ok(serde_json::Value::Object(map)) => map,
                    Ok(other) => {
                        return Err(InferenceError::MalformedResponse {
                            reason: format!(
                                "tool call '{}' arguments are not an object: {other}",
                                call.function.name
                            ),
                        })
                    }
                    Err(e) => {
                        return Err(InferenceError::MalformedResponse {
                            reason: format!(
                                "tool call '{}' has invalid JSON arguments: {e}",
                                call.function.name
                            ),
                        })
                    }
                }
            }
            other => {
                return Err(InferenceError::MalformedResponse {
                    reason: format!(
                        "tool call '{}' arguments are not an object: {other}",
                        call.function.name
                    ),
                })
            }
        };

        Ok(Self {
            id: call
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
            tool_name: call.function.name.clone(),
            arguments,
        })
    }

    /// Plain-text rendering of the call, e.g. `get_weather({"city":"Oslo"})`.
    ///
    /// Used when a call cannot be executed and must be shown instead of
    /// silently dropped.
    pub fn describe(&self) -> String {
        format!(
            "{}({})",
            self.tool_name,
            serde_json::Value::Object(self.arguments.clone())
        )
    }
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// One incremental unit of a streamed response.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    /// Text generated since the previous chunk (never cumulative).
    pub delta_text: String,
    /// Set on the last chunk of the stream.
    pub is_final: bool,
    /// A tool call requested by the model. Only ever set on the final chunk.
    pub tool_invocation: Option<ToolInvocation>,
}

/// Item of a completion stream.
#[derive(Debug)]
pub enum StreamEvent {
    Chunk(StreamChunk),
    /// A chunk was discarded; the stream goes on.
    Warning(InferenceError),
}

/// Raw NDJSON line from `/api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseLine {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    #[allow(dead_code)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The `message` object within a response line.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: String,
    /// Reasoning output from thinking models. Deserialized so the field is
    /// tolerated, never surfaced as answer text.
    #[serde(default)]
    #[allow(dead_code)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
}

/// Raw `/api/tags` response.
#[derive(Debug, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
