//! Ollama inference client.
//!
//! Lists the models a local Ollama server offers and sends chat completion
//! requests, streaming back text increments and tool calls.

use std::time::Duration;

use futures::Stream;
use reqwest::Client as HttpClient;

use super::errors::InferenceError;
use super::streaming::parse_ndjson_stream;
use super::types::{
    ChatMessage, ChatRequest, ChatResponseLine, ModelDescriptor, StreamChunk, StreamEvent,
    TagsResponse, ToolDefinition, ToolInvocation,
};
use crate::config::InferenceConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the lightweight availability probe.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the local Ollama endpoint.
///
/// Holds no conversation state: the caller owns the message history and
/// passes it in on every request. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    /// HTTP client for model listing and non-streaming calls (bounded).
    http: HttpClient,
    /// HTTP client for streaming calls (connect timeout only).
    http_stream: HttpClient,
    base_url: String,
}

impl InferenceClient {
    /// Create a new client from the inference configuration.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

        let http = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .timeout(Duration::from_secs(config.list_timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        // Generation length is unbounded, so streaming gets no total timeout.
        let http_stream = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| InferenceError::ConfigError {
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            http_stream,
            base_url,
        })
    }

    /// The base URL of the inference endpoint.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ─── Models ──────────────────────────────────────────────────────────

    /// List the models available on the server, in the order it reports them.
    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| InferenceError::from_transport(&url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| InferenceError::from_transport(&url, &e))?;
        let tags: TagsResponse =
            serde_json::from_str(&body).map_err(|e| InferenceError::MalformedResponse {
                reason: format!("failed to parse model list: {e}"),
            })?;

        tracing::debug!(count = tags.models.len(), "listed models");
        Ok(tags.models)
    }

    /// Check if the server is reachable.
    ///
    /// Never errors: any failure reads as "not available".
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.http.get(&url).timeout(HEALTH_CHECK_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    // ─── Chat Completion (streaming) ─────────────────────────────────────

    /// Send a streaming chat completion request.
    ///
    /// Returns once the response headers arrive. The stream yields text
    /// increments in generation order and ends after the chunk marked
    /// `is_final`. Dropping the stream closes the connection.
    pub async fn stream_completion(
        &self,
        conversation: &[ChatMessage],
        model: &str,
        tools: Option<&[ToolDefinition]>,
    ) -> Result<impl Stream<Item = Result<StreamEvent, InferenceError>>, InferenceError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model,
            messages: conversation,
            stream: true,
            tools,
        };

        // Log the request metadata (not the full body, it can be huge)
        tracing::info!(
            url = %url,
            model = %model,
            message_count = conversation.len(),
            tool_count = tools.map(|t| t.len()).unwrap_or(0),
            "chat request"
        );

        let response = self
            .http_stream
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::from_transport(&url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        Ok(parse_ndjson_stream(response.bytes_stream(), url))
    }

    // ─── Chat Completion (non-streaming) ─────────────────────────────────

    /// Send a non-streaming chat completion request.
    ///
    /// Returns the whole response as a single final `StreamChunk`.
    pub async fn chat_completion(
        &self,
        conversation: &[ChatMessage],
        model: &str,
        tools: Option<&[ToolDefinition]>,
    ) -> Result<StreamChunk, InferenceError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model,
            messages: conversation,
            stream: false,
            tools,
        };

        let response = self
            .http_stream
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::from_transport(&url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::from_transport(&url, &e))?;

        parse_non_streaming_response(&body_text)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Parse a non-streaming `/api/chat` body into a single final chunk.
pub fn parse_non_streaming_response(body: &str) -> Result<StreamChunk, InferenceError> {
    let line: ChatResponseLine =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse chat response: {e}"),
        })?;

    if let Some(message) = line.error {
        return Err(InferenceError::ServerError { message });
    }

    let message = line.message.ok_or(InferenceError::MalformedResponse {
        reason: "chat response has no message".into(),
    })?;

    let tool_invocation = message
        .tool_calls
        .first()
        .map(ToolInvocation::try_from_wire)
        .transpose()?;

    Ok(StreamChunk {
        delta_text: message.content,
        is_final: true,
        tool_invocation,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
