//! Turn driver: one user message through the tool-calling handshake.
//!
//! ```text
//! AwaitingModelResponse ─► Idle
//!        │
//!        └► ToolRequested ─► ToolExecuting ─► AwaitingFollowupResponse ─► Idle
//! ```
//!
//! At most one tool round-trip per turn: the follow-up request carries no
//! tool definitions. Every exit path, including errors and cancellation,
//! ends in `Idle` and a `Finished` event.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::inference::{
    ChatMessage, InferenceClient, InferenceError, StreamEvent, ToolDefinition, ToolInvocation,
};

use super::errors::AgentError;
use super::session::{SessionContext, StreamLease};
use super::tool_dispatcher::ToolDispatcher;

// ─── Types ──────────────────────────────────────────────────────────────────

/// Where a turn currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingModelResponse,
    ToolRequested,
    ToolExecuting,
    AwaitingFollowupResponse,
    Idle,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { tool_used: bool },
    /// The model asked for a tool that isn't registered.
    UnknownTool { name: String },
    Failed { reason: String },
    Cancelled,
}

/// Progress reported to the front end while a turn runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    StateChanged(TurnState),
    /// A text increment from the model.
    Token(String),
    /// A discarded chunk or ignored tool call; the turn continues.
    Warning(String),
    ToolRequested {
        name: String,
        arguments: serde_json::Value,
    },
    ToolCompleted {
        name: String,
        display: String,
        success: bool,
    },
    Error(String),
    Finished(TurnOutcome),
}

/// Sink for [`TurnEvent`]s. A closed receiver is ignored.
pub type TurnEvents = mpsc::UnboundedSender<TurnEvent>;

fn emit(events: &TurnEvents, event: TurnEvent) {
    let _ = events.send(event);
}

// ─── Turn ───────────────────────────────────────────────────────────────────

/// Run one user turn to completion.
///
/// Returns `NoModelSelected` or `StreamBusy` before touching the
/// conversation. Every other failure is reported through `events` and the
/// returned [`TurnOutcome`].
pub async fn run_turn(
    ctx: &SessionContext,
    client: &InferenceClient,
    dispatcher: &ToolDispatcher,
    text: &str,
    events: &TurnEvents,
) -> Result<TurnOutcome, AgentError> {
    let turn = begin_turn(ctx)?;
    Ok(turn.run(ctx, client, dispatcher, text, events).await)
}

/// Claim the session's stream slot for a new turn.
///
/// The slot stays held until the returned [`ClaimedTurn`] has run or is
/// dropped, so callers that hand the turn to another task keep the session
/// busy in the meantime.
pub fn begin_turn(ctx: &SessionContext) -> Result<ClaimedTurn, AgentError> {
    let model = ctx.selected_model().ok_or(AgentError::NoModelSelected)?;
    let lease = ctx.try_begin_stream()?;
    Ok(ClaimedTurn { model, lease })
}

/// A turn that owns the stream slot but hasn't started yet.
#[derive(Debug)]
pub struct ClaimedTurn {
    model: String,
    lease: StreamLease,
}

impl ClaimedTurn {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn run(
        self,
        ctx: &SessionContext,
        client: &InferenceClient,
        dispatcher: &ToolDispatcher,
        text: &str,
        events: &TurnEvents,
    ) -> TurnOutcome {
        let Self { model, lease } = self;
        ctx.push(ChatMessage::user(text));
        tracing::info!(session_id = %ctx.id(), model = %model, "turn started");

        let outcome = drive(ctx, client, dispatcher, &model, lease.token(), events).await;
        drop(lease);

        tracing::info!(session_id = %ctx.id(), outcome = ?outcome, "turn finished");
        emit(events, TurnEvent::StateChanged(TurnState::Idle));
        emit(events, TurnEvent::Finished(outcome.clone()));
        outcome
    }
}

async fn drive(
    ctx: &SessionContext,
    client: &InferenceClient,
    dispatcher: &ToolDispatcher,
    model: &str,
    cancel: &CancellationToken,
    events: &TurnEvents,
) -> TurnOutcome {
    emit(events, TurnEvent::StateChanged(TurnState::AwaitingModelResponse));
    let tools = Some(dispatcher.definitions()).filter(|d| !d.is_empty());
    let first = match stream_phase(client, &ctx.messages(), model, tools, cancel, events).await {
        Phase::Done(response) => response,
        Phase::Cancelled => return TurnOutcome::Cancelled,
        Phase::Failed(e) => return fail(events, e),
    };

    let Some(invocation) = first.invocation else {
        ctx.push(ChatMessage::assistant(first.text));
        return TurnOutcome::Completed { tool_used: false };
    };

    emit(events, TurnEvent::StateChanged(TurnState::ToolRequested));
    emit(
        events,
        TurnEvent::ToolRequested {
            name: invocation.tool_name.clone(),
            arguments: serde_json::Value::Object(invocation.arguments.clone()),
        },
    );

    if let Err(e) = dispatcher.resolve(&invocation) {
        tracing::warn!(tool = %invocation.tool_name, "model requested an unknown tool");
        ctx.push(ChatMessage::assistant(with_call_text(first.text, &invocation)));
        emit(events, TurnEvent::Error(e.to_string()));
        return TurnOutcome::UnknownTool {
            name: invocation.tool_name,
        };
    }

    emit(events, TurnEvent::StateChanged(TurnState::ToolExecuting));
    let execution = tokio::select! {
        biased;
        _ = cancel.cancelled() => return TurnOutcome::Cancelled,
        result = dispatcher.execute(&invocation) => result,
    };
    let execution = match execution {
        Ok(execution) => execution,
        Err(e) => return fail(events, e),
    };

    emit(
        events,
        TurnEvent::ToolCompleted {
            name: invocation.tool_name.clone(),
            display: execution.display,
            success: execution.succeeded,
        },
    );
    ctx.extend([
        ChatMessage::assistant_tool_call(first.text, &invocation),
        execution.message,
    ]);

    emit(events, TurnEvent::StateChanged(TurnState::AwaitingFollowupResponse));
    let followup = match stream_phase(client, &ctx.messages(), model, None, cancel, events).await {
        Phase::Done(response) => response,
        Phase::Cancelled => return TurnOutcome::Cancelled,
        Phase::Failed(e) => return fail(events, e),
    };

    let text = match followup.invocation {
        Some(chained) => {
            tracing::warn!(tool = %chained.tool_name, "ignoring chained tool call");
            emit(
                events,
                TurnEvent::Warning(format!(
                    "ignored a second tool call in the same turn: {}",
                    chained.describe()
                )),
            );
            with_call_text(followup.text, &chained)
        }
        None => followup.text,
    };
    ctx.push(ChatMessage::assistant(text));
    TurnOutcome::Completed { tool_used: true }
}

fn fail(events: &TurnEvents, error: impl Into<AgentError>) -> TurnOutcome {
    let error = error.into();
    tracing::error!(error = %error, "turn failed");
    emit(events, TurnEvent::Error(error.to_string()));
    TurnOutcome::Failed {
        reason: error.to_string(),
    }
}

/// Append a plain-text rendering of a tool call the turn won't execute.
fn with_call_text(text: String, invocation: &ToolInvocation) -> String {
    let call = format!("[Tool call: {}]", invocation.describe());
    if text.trim().is_empty() {
        call
    } else {
        format!("{}\n\n{call}", text.trim_end())
    }
}

// ─── Stream phase ───────────────────────────────────────────────────────────

struct PhaseResponse {
    text: String,
    invocation: Option<ToolInvocation>,
}

enum Phase {
    Done(PhaseResponse),
    Cancelled,
    Failed(InferenceError),
}

/// Stream one response, forwarding tokens, until the final chunk.
///
/// Cancellation drops the stream, which closes the connection; whatever was
/// received is discarded.
async fn stream_phase(
    client: &InferenceClient,
    conversation: &[ChatMessage],
    model: &str,
    tools: Option<&[ToolDefinition]>,
    cancel: &CancellationToken,
    events: &TurnEvents,
) -> Phase {
    let stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Phase::Cancelled,
        result = client.stream_completion(conversation, model, tools) => match result {
            Ok(stream) => stream,
            Err(e) => return Phase::Failed(e),
        },
    };
    futures::pin_mut!(stream);

    let mut text = String::new();
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Phase::Cancelled,
            item = stream.next() => item,
        };

        match item {
            Some(Ok(StreamEvent::Chunk(chunk))) => {
                if !chunk.delta_text.is_empty() {
                    text.push_str(&chunk.delta_text);
                    emit(events, TurnEvent::Token(chunk.delta_text));
                }
                if chunk.is_final {
                    return Phase::Done(PhaseResponse {
                        text,
                        invocation: chunk.tool_invocation,
                    });
                }
            }
            Some(Ok(StreamEvent::Warning(warning))) => {
                tracing::warn!(warning = %warning, "discarded stream line");
                emit(events, TurnEvent::Warning(warning.to_string()));
            }
            Some(Err(e)) => return Phase::Failed(e),
            None => {
                return Phase::Failed(InferenceError::MalformedResponse {
                    reason: "stream ended before the completion marker".into(),
                })
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
