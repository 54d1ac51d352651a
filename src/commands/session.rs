//! Commands for chat sessions: history listing, loading, saving, and new
//! chats.

use std::io::Write;

use crate::agent_core::history::{load_chat, sanitize_model};
use crate::agent_core::{AgentError, ChatSummary};
use crate::inference::{ChatMessage, Role};

use super::AppState;

/// `YYYY-mm-dd HH:MM:SS | model | N messages`.
pub fn format_summary(summary: &ChatSummary) -> String {
    format!(
        "{} | {} | {} messages",
        summary.timestamp.format("%Y-%m-%d %H:%M:%S"),
        summary.model,
        summary.message_count
    )
}

/// `/history`: numbered list of saved chats, newest first.
pub fn list_history(state: &AppState, out: &mut impl Write) -> anyhow::Result<()> {
    let chats = state.history.list_chats()?;
    if chats.is_empty() {
        writeln!(out, "No chat history found.")?;
        return Ok(());
    }
    writeln!(out, "Previous chats:")?;
    for (i, chat) in chats.iter().enumerate() {
        writeln!(out, "{:3}. {}", i + 1, format_summary(chat))?;
    }
    Ok(())
}

/// `/load <n>`: replace the conversation with saved chat `n` (1-based,
/// newest first) and print it.
///
/// Restores the chat's model when the server offers it.
pub fn load_history(state: &AppState, index: usize, out: &mut impl Write) -> anyhow::Result<()> {
    let chats = state.history.list_chats()?;
    let Some(summary) = index.checked_sub(1).and_then(|i| chats.get(i)) else {
        writeln!(out, "No chat #{index} (see /history).")?;
        return Ok(());
    };

    let chat = load_chat(&summary.path)?;
    state
        .session
        .replace(chat.messages.clone(), Some(summary.path.clone()))?;

    let wanted = chat.model.unwrap_or_else(|| summary.model.clone());
    let wanted = sanitize_model(&wanted);
    if let Some(model) = state
        .models()
        .into_iter()
        .find(|m| sanitize_model(&m.name) == wanted)
    {
        state.session.select_model(model.name);
    }

    for message in &chat.messages {
        print_message(message, out)?;
    }
    writeln!(out, "\nChat loaded ({} messages).", chat.messages.len())?;
    Ok(())
}

/// `/new`: save the current chat, then start an empty one.
pub fn new_chat(state: &AppState, out: &mut impl Write) -> anyhow::Result<()> {
    if state.session.is_streaming() {
        return Err(AgentError::StreamBusy.into());
    }
    if let Some(path) = state.history.save_session(&state.session)? {
        writeln!(out, "Chat saved to {}", path.display())?;
    }
    state.session.clear()?;
    writeln!(out, "New chat started.")?;
    Ok(())
}

/// `/save`: save the current chat.
pub fn save_chat(state: &AppState, out: &mut impl Write) -> anyhow::Result<()> {
    match state.history.save_session(&state.session)? {
        Some(path) => writeln!(out, "Chat saved to {}", path.display())?,
        None => writeln!(out, "Nothing to save yet.")?,
    }
    Ok(())
}

/// Save after a finished turn. Failures are logged, not surfaced.
pub fn auto_save(state: &AppState) {
    if let Err(e) = state.history.save_session(&state.session) {
        tracing::error!(error = %e, "auto-save failed");
    }
}

fn print_message(message: &ChatMessage, out: &mut impl Write) -> std::io::Result<()> {
    let label = match message.role {
        Role::System => "System",
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::Tool => "Tool",
    };
    writeln!(out, "\n{label}: {}", message.content)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
