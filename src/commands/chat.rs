//! Chat commands: start a turn in the background and render its events.

use std::io::Write;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent_core::{begin_turn, AgentError, TurnEvent, TurnOutcome, TurnState};

use super::AppState;

/// A turn running on a background task.
pub struct ActiveTurn {
    pub handle: JoinHandle<TurnOutcome>,
    /// Closes once the turn task has finished.
    pub events: mpsc::UnboundedReceiver<TurnEvent>,
}

/// Start a turn for `text`.
///
/// Fails up front with `NoModelSelected` or `StreamBusy` so the caller can
/// report it before anything is printed for the turn. The stream slot is
/// claimed here, before the task is spawned, so commands read right after
/// this returns already see the session as busy.
pub fn start_turn(state: &Arc<AppState>, text: String) -> Result<ActiveTurn, AgentError> {
    let turn = begin_turn(&state.session)?;

    let (tx, events) = mpsc::unbounded_channel();
    let state = Arc::clone(state);
    let handle = tokio::spawn(async move {
        turn.run(&state.session, &state.client, &state.dispatcher, &text, &tx)
            .await
    });

    Ok(ActiveTurn { handle, events })
}

/// Print one turn event.
pub fn render_event(event: &TurnEvent, out: &mut impl Write) -> std::io::Result<()> {
    match event {
        TurnEvent::StateChanged(
            TurnState::AwaitingModelResponse | TurnState::AwaitingFollowupResponse,
        ) => write!(out, "\nAssistant: ")?,
        TurnEvent::StateChanged(_) => {}
        TurnEvent::Token(text) => write!(out, "{text}")?,
        TurnEvent::Warning(message) => write!(out, "\n[Warning: {message}]")?,
        TurnEvent::ToolRequested { name, .. } => write!(out, "\n[Calling tool: {name}]")?,
        TurnEvent::ToolCompleted { display, .. } => write!(out, "\n\n{display}\n")?,
        TurnEvent::Error(message) => write!(out, "\n[Error: {message}]")?,
        TurnEvent::Finished(TurnOutcome::Cancelled) => writeln!(out, "\n[Stopped]")?,
        TurnEvent::Finished(_) => writeln!(out)?,
    }
    out.flush()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
