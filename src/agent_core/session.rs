//! SessionContext: the state of one chat session.
//!
//! Holds the selected model, the conversation, and the slot for the single
//! in-flight completion stream. Passed explicitly to every operation that
//! needs it.
//!
//! Locks are std mutexes held only for short synchronous sections, never
//! across an `.await`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;

use crate::inference::{ChatMessage, Role};

use super::errors::AgentError;

// ─── StreamLease ────────────────────────────────────────────────────────────

/// Exclusive right to run a completion stream in a session.
///
/// Dropping the lease frees the slot.
#[derive(Debug)]
pub struct StreamLease {
    slot: Arc<Mutex<Option<CancellationToken>>>,
    token: CancellationToken,
}

impl StreamLease {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        lock(&self.slot).take();
    }
}

// ─── SessionContext ─────────────────────────────────────────────────────────

/// Mutable state of a chat session.
#[derive(Debug)]
pub struct SessionContext {
    id: String,
    system_prompt: Option<String>,
    selected_model: RwLock<Option<String>>,
    conversation: Mutex<Vec<ChatMessage>>,
    active_stream: Arc<Mutex<Option<CancellationToken>>>,
    /// File this session was last saved to or loaded from.
    saved_path: Mutex<Option<PathBuf>>,
}

impl SessionContext {
    /// Start an empty session, seeded with the system prompt if one is set.
    pub fn new(system_prompt: Option<String>) -> Self {
        let system_prompt = system_prompt.filter(|p| !p.trim().is_empty());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation: Mutex::new(seed(system_prompt.as_deref())),
            system_prompt,
            selected_model: RwLock::new(None),
            active_stream: Arc::new(Mutex::new(None)),
            saved_path: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // ─── Model ──────────────────────────────────────────────────────────

    pub fn select_model(&self, name: impl Into<String>) {
        let name = name.into();
        tracing::info!(session_id = %self.id, model = %name, "model selected");
        *self
            .selected_model
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(name);
    }

    pub fn selected_model(&self) -> Option<String> {
        self.selected_model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ─── Conversation ───────────────────────────────────────────────────

    /// Snapshot of the conversation.
    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.conversation).clone()
    }

    pub fn push(&self, message: ChatMessage) {
        lock(&self.conversation).push(message);
    }

    /// Append several messages under one lock so they land together.
    pub fn extend(&self, messages: impl IntoIterator<Item = ChatMessage>) {
        lock(&self.conversation).extend(messages);
    }

    pub fn len(&self) -> usize {
        lock(&self.conversation).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.conversation).is_empty()
    }

    /// Whether the conversation holds anything besides the system prompt.
    pub fn has_exchanges(&self) -> bool {
        lock(&self.conversation)
            .iter()
            .any(|m| m.role != Role::System)
    }

    /// Start a fresh conversation. Keeps the system prompt and model.
    pub fn clear(&self) -> Result<(), AgentError> {
        self.ensure_idle()?;
        *lock(&self.conversation) = seed(self.system_prompt.as_deref());
        lock(&self.saved_path).take();
        tracing::info!(session_id = %self.id, "conversation cleared");
        Ok(())
    }

    /// Swap in a saved conversation; later saves overwrite `source`.
    pub fn replace(&self, messages: Vec<ChatMessage>, source: Option<PathBuf>) -> Result<(), AgentError> {
        self.ensure_idle()?;
        let count = messages.len();
        *lock(&self.conversation) = messages;
        *lock(&self.saved_path) = source;
        tracing::info!(session_id = %self.id, message_count = count, "conversation replaced");
        Ok(())
    }

    pub fn saved_path(&self) -> Option<PathBuf> {
        lock(&self.saved_path).clone()
    }

    pub fn set_saved_path(&self, path: &Path) {
        *lock(&self.saved_path) = Some(path.to_path_buf());
    }

    // ─── Active stream ──────────────────────────────────────────────────

    /// Claim the stream slot, or `StreamBusy` if a stream is in flight.
    pub fn try_begin_stream(&self) -> Result<StreamLease, AgentError> {
        let mut slot = lock(&self.active_stream);
        if slot.is_some() {
            return Err(AgentError::StreamBusy);
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(StreamLease {
            slot: Arc::clone(&self.active_stream),
            token,
        })
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.active_stream).is_some()
    }

    /// Cancel the in-flight stream. Returns whether one was active.
    pub fn cancel_stream(&self) -> bool {
        match lock(&self.active_stream).as_ref() {
            Some(token) => {
                token.cancel();
                tracing::info!(session_id = %self.id, "stream cancelled");
                true
            }
            None => false,
        }
    }

    fn ensure_idle(&self) -> Result<(), AgentError> {
        if self.is_streaming() {
            Err(AgentError::StreamBusy)
        } else {
            Ok(())
        }
    }
}

fn seed(system_prompt: Option<&str>) -> Vec<ChatMessage> {
    system_prompt
        .map(|p| vec![ChatMessage::system(p)])
        .unwrap_or_default()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
