//! Terminal commands for the chat REPL.
//!
//! Each input line is parsed into a [`Command`] and handled against the
//! shared [`AppState`]. Handlers write to any `io::Write` so they can be
//! exercised without a terminal.

pub mod chat;
pub mod ollama;
pub mod session;

use std::sync::{Arc, Mutex, PoisonError};

use crate::agent_core::tools::build_default_registry;
use crate::agent_core::{ChatHistory, SessionContext, ToolDispatcher};
use crate::config::AppConfig;
use crate::inference::{InferenceClient, ModelDescriptor};

// ─── App State ──────────────────────────────────────────────────────────────

/// Everything the command handlers share.
pub struct AppState {
    pub config: AppConfig,
    pub client: InferenceClient,
    pub dispatcher: ToolDispatcher,
    pub history: ChatHistory,
    pub session: Arc<SessionContext>,
    /// Models from the last successful listing.
    models: Mutex<Vec<ModelDescriptor>>,
}

impl AppState {
    /// Build the client, tool registry, and history store from config.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let client = InferenceClient::new(&config.inference)?;
        let dispatcher = ToolDispatcher::new(build_default_registry(&config.market_data)?);
        let history = ChatHistory::new(config.history.resolve_dir());
        let session = Arc::new(SessionContext::new(config.inference.system_prompt.clone()));

        tracing::info!(
            base_url = %client.base_url(),
            tools = ?dispatcher.registry().tool_names(),
            history_dir = %history.dir().display(),
            "app state initialized"
        );

        Ok(Self {
            config,
            client,
            dispatcher,
            history,
            session,
            models: Mutex::new(Vec::new()),
        })
    }

    pub fn models(&self) -> Vec<ModelDescriptor> {
        self.models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_models(&self, models: Vec<ModelDescriptor>) {
        *self.models.lock().unwrap_or_else(PoisonError::into_inner) = models;
    }
}

// ─── Command Parsing ────────────────────────────────────────────────────────

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text to send to the model.
    Send(String),
    Models,
    Model(String),
    History,
    /// 1-based index into the last `/history` listing.
    Load(usize),
    New,
    Save,
    Stop,
    Help,
    Quit,
    /// Blank line.
    Empty,
    /// A slash command that couldn't be parsed, with the message to show.
    Invalid(String),
}

/// Parse an input line.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match (name, arg) {
        ("models", "") => Command::Models,
        ("model", "") => Command::Invalid("usage: /model <name>".into()),
        ("model", name) => Command::Model(name.to_string()),
        ("history", "") => Command::History,
        ("load", n) => match n.parse::<usize>() {
            Ok(n) if n >= 1 => Command::Load(n),
            _ => Command::Invalid("usage: /load <n> (see /history)".into()),
        },
        ("new", "") => Command::New,
        ("save", "") => Command::Save,
        ("stop", "") => Command::Stop,
        ("help", "") => Command::Help,
        ("quit", "") | ("exit", "") => Command::Quit,
        _ => Command::Invalid(format!("unknown command '/{name}' (try /help)")),
    }
}

pub const HELP: &str = "\
Type a message to chat. Commands:
  /models          refresh and list available models
  /model <name>    select a model
  /history         list saved chats
  /load <n>        load chat n from /history
  /new             save this chat and start a new one
  /save            save this chat
  /stop            stop the current response (also Ctrl-C)
  /help            show this help
  /quit            exit";

// ─── Tests ───────────────────────────────────────────────────────────────────
