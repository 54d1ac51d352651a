//! ChatHistory: saved sessions on disk.
//!
//! One JSON file per session, named
//! `chat_<model, ':' replaced by '_'>_<YYYYmmdd_HHMMSS>.json` and holding the
//! conversation as a JSON array of messages. A second session saved in the
//! same second gets a `-2`, `-3`, ... suffix before `.json`. Re-saving a session overwrites
//! its file atomically (temp file + rename).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::Deserialize;

use crate::inference::ChatMessage;

use super::errors::AgentError;
use super::session::SessionContext;

const FILE_PREFIX: &str = "chat_";
const FILE_SUFFIX: &str = ".json";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Model name recorded when a session is saved before any model was chosen.
const UNKNOWN_MODEL: &str = "unknown";

/// Listing entry for a saved chat.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSummary {
    pub path: PathBuf,
    /// Model name as it appears in the file name (`:` replaced by `_`).
    pub model: String,
    pub timestamp: NaiveDateTime,
    pub message_count: usize,
}

/// A chat read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedChat {
    pub messages: Vec<ChatMessage>,
    /// Only present in the legacy object format.
    pub model: Option<String>,
}

/// On-disk shapes accepted by the loader.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredChat {
    Messages(Vec<ChatMessage>),
    Legacy {
        #[serde(default)]
        model: Option<String>,
        messages: Vec<ChatMessage>,
    },
}

/// Directory of saved chat sessions.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    dir: PathBuf,
}

impl ChatHistory {
    /// The directory is created on the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save the session's conversation.
    ///
    /// Returns `None` when there is nothing to save (no messages besides the
    /// system prompt). The first save picks a file name; later saves of the
    /// same session overwrite it.
    pub fn save_session(&self, ctx: &SessionContext) -> Result<Option<PathBuf>, AgentError> {
        if !ctx.has_exchanges() {
            return Ok(None);
        }

        let path = match ctx.saved_path() {
            Some(path) => path,
            None => {
                let model = ctx.selected_model();
                self.unused_path(
                    model.as_deref().unwrap_or(UNKNOWN_MODEL),
                    Local::now().naive_local(),
                )
            }
        };

        let messages = ctx.messages();
        write_atomic(&path, &serde_json::to_vec_pretty(&messages)?)?;
        ctx.set_saved_path(&path);

        tracing::info!(
            session_id = %ctx.id(),
            path = %path.display(),
            message_count = messages.len(),
            "chat saved"
        );
        Ok(Some(path))
    }

    /// Saved chats, newest first. Unreadable files are logged and skipped.
    pub fn list_chats(&self) -> Result<Vec<ChatSummary>, AgentError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(persistence_error(&self.dir, e)),
        };

        let mut chats = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some((model, timestamp, seq)) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_file_name)
            else {
                continue;
            };

            match load_chat(&path) {
                Ok(chat) => chats.push((
                    seq,
                    ChatSummary {
                        path,
                        model,
                        timestamp,
                        message_count: chat.messages.len(),
                    },
                )),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable chat file");
                }
            }
        }

        chats.sort_by(|(a_seq, a), (b_seq, b)| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b_seq.cmp(a_seq))
                .then_with(|| b.path.cmp(&a.path))
        });
        Ok(chats.into_iter().map(|(_, chat)| chat).collect())
    }

    /// Path for a session's first save that no other chat is using.
    fn unused_path(&self, model: &str, at: NaiveDateTime) -> PathBuf {
        let name = file_name(model, at);
        let first = self.dir.join(&name);
        if !first.exists() {
            return first;
        }
        let stem = name.strip_suffix(FILE_SUFFIX).unwrap_or(&name);
        (2u32..)
            .map(|n| self.dir.join(format!("{stem}-{n}{FILE_SUFFIX}")))
            .find(|path| !path.exists())
            .unwrap_or(first)
    }
}

/// Read a saved chat. Accepts a bare message array or the legacy
/// `{model, timestamp, messages}` object.
pub fn load_chat(path: &Path) -> Result<SavedChat, AgentError> {
    let raw = fs::read_to_string(path).map_err(|e| persistence_error(path, e))?;
    let stored: StoredChat =
        serde_json::from_str(&raw).map_err(|e| persistence_error(path, e))?;

    Ok(match stored {
        StoredChat::Messages(messages) => SavedChat {
            messages,
            model: None,
        },
        StoredChat::Legacy { model, messages } => SavedChat { messages, model },
    })
}

/// `chat_<model>_<YYYYmmdd_HHMMSS>.json`.
pub fn file_name(model: &str, at: NaiveDateTime) -> String {
    format!(
        "{FILE_PREFIX}{}_{}{FILE_SUFFIX}",
        sanitize_model(model),
        at.format(TIMESTAMP_FORMAT)
    )
}

/// File-name form of a model name.
pub fn sanitize_model(model: &str) -> String {
    model.replace([':', '/', '\\'], "_")
}

/// Split a history file name into its model, timestamp and collision
/// sequence (1 when there is no `-N` suffix).
fn parse_file_name(name: &str) -> Option<(String, NaiveDateTime, u32)> {
    let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    let (stem, seq) = match stem.rsplit_once('-') {
        Some((head, n)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
            (head, n.parse().ok()?)
        }
        _ => (stem, 1),
    };
    let mut parts = stem.rsplitn(3, '_');
    let time = parts.next()?;
    let date = parts.next()?;
    let model = parts.next()?;
    let timestamp =
        NaiveDateTime::parse_from_str(&format!("{date}_{time}"), TIMESTAMP_FORMAT).ok()?;
    Some((model.to_string(), timestamp, seq))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AgentError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| persistence_error(parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|e| persistence_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        persistence_error(path, e)
    })
}

fn persistence_error(path: &Path, e: impl std::fmt::Display) -> AgentError {
    AgentError::PersistenceError {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
