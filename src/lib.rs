pub mod agent_core;
pub mod commands;
pub mod config;
pub mod inference;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use agent_core::TurnEvent;
use commands::chat::{render_event, start_turn, ActiveTurn};
use commands::{parse_command, AppState, Command, HELP};

/// Return the platform-standard data directory for Ollama Chat.
///
/// - macOS: `~/Library/Application Support/ollama-chat/`
/// - Windows: `{FOLDERID_RoamingAppData}\ollama-chat\`
/// - Linux: `$XDG_DATA_HOME/ollama-chat/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.ollama_chat/` only if none of the above can be resolved.
pub(crate) fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("ollama-chat");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ollama_chat")
}

/// Initialize the tracing subscriber, writing to `chat.log` in the data
/// directory. stdout belongs to the chat transcript.
///
/// On each startup:
/// 1. Rotates existing logs (chat.log → chat.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh chat.log. `File` is unbuffered, so every event is on
///    disk as soon as it is logged.
/// 3. Logs a startup banner with the data directory path.
fn init_tracing() -> std::io::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join("chat.log");
    rotate_logs(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ollama_chat=info,warn"));

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== Ollama Chat starting ==="
    );
    Ok(log_path)
}

/// Shift `chat.log` to `chat.log.1`, `.1` to `.2`, and so on, dropping
/// whatever would land past `.{keep}`.
fn rotate_logs(log_path: &Path, keep: u32) {
    if keep == 0 {
        return;
    }
    let numbered = |n: u32| {
        let mut name = log_path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    };

    // Best effort; tracing isn't initialized yet.
    let _ = std::fs::remove_file(numbered(keep));
    for n in (1..keep).rev() {
        let from = numbered(n);
        if from.exists() {
            let _ = std::fs::rename(&from, numbered(n + 1));
        }
    }
    if log_path.exists() {
        let _ = std::fs::rename(log_path, numbered(1));
    }
}

// ─── REPL ───────────────────────────────────────────────────────────────────

enum Flow {
    Continue,
    Quit,
}

/// Run the terminal chat client until `/quit`, Ctrl-C while idle, or EOF.
pub async fn run() -> anyhow::Result<()> {
    if let Err(e) = init_tracing() {
        eprintln!("warning: file logging disabled: {e}");
    }

    let config = config::load_or_default().context("failed to load configuration")?;
    let state = Arc::new(AppState::new(config).context("failed to initialize")?);
    let mut out = std::io::stdout();

    writeln!(out, "Ollama Chat v{}. Type /help for commands.", env!("CARGO_PKG_VERSION"))?;
    if commands::ollama::check_connection(&state, &mut out).await? {
        commands::ollama::refresh_models(&state, &mut out).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut active: Option<ActiveTurn> = None;
    prompt(&mut out)?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read input")? else {
                    break;
                };
                if let Flow::Quit = handle_line(&state, &line, &mut active, &mut out).await? {
                    break;
                }
                if active.is_none() {
                    prompt(&mut out)?;
                }
            }
            event = next_turn_event(&mut active) => match event {
                Some(event) => render_event(&event, &mut out)?,
                None => {
                    finish_turn(&state, &mut active).await;
                    prompt(&mut out)?;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                if !state.session.cancel_stream() {
                    writeln!(out)?;
                    break;
                }
            }
        }
    }

    if active.is_some() {
        state.session.cancel_stream();
        while let Some(event) = next_turn_event(&mut active).await {
            render_event(&event, &mut out)?;
        }
        finish_turn(&state, &mut active).await;
    } else {
        commands::session::auto_save(&state);
    }

    tracing::info!("=== Ollama Chat exiting ===");
    writeln!(out, "Goodbye.")?;
    Ok(())
}

async fn handle_line(
    state: &Arc<AppState>,
    line: &str,
    active: &mut Option<ActiveTurn>,
    out: &mut impl Write,
) -> anyhow::Result<Flow> {
    let result: anyhow::Result<()> = match parse_command(line) {
        Command::Empty => Ok(()),
        Command::Send(_) if active.is_some() => Err(agent_core::AgentError::StreamBusy.into()),
        Command::Send(text) => {
            // The server may have come up since the last check.
            if state.session.selected_model().is_none() {
                commands::ollama::refresh_models(state, out).await?;
            }
            match start_turn(state, text) {
                Ok(turn) => {
                    *active = Some(turn);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Models => commands::ollama::list_models(state, out)
            .await
            .map_err(Into::into),
        Command::Model(name) => commands::ollama::select_model(state, &name, out).map_err(Into::into),
        Command::History => commands::session::list_history(state, out),
        Command::Load(index) => commands::session::load_history(state, index, out),
        Command::New => commands::session::new_chat(state, out),
        Command::Save => commands::session::save_chat(state, out),
        Command::Stop => {
            if !state.session.cancel_stream() {
                writeln!(out, "Nothing to stop.")?;
            }
            Ok(())
        }
        Command::Help => writeln!(out, "{HELP}").map_err(Into::into),
        Command::Quit => return Ok(Flow::Quit),
        Command::Invalid(message) => writeln!(out, "{message}").map_err(Into::into),
    };

    if let Err(e) = result {
        tracing::warn!(error = %e, "command failed");
        writeln!(out, "[Error: {e:#}]")?;
    }
    Ok(Flow::Continue)
}

/// Next event of the active turn; `None` once it has finished. Pending
/// forever when no turn is active.
async fn next_turn_event(active: &mut Option<ActiveTurn>) -> Option<TurnEvent> {
    match active {
        Some(turn) => turn.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn finish_turn(state: &AppState, active: &mut Option<ActiveTurn>) {
    let Some(turn) = active.take() else {
        return;
    };
    match turn.handle.await {
        Ok(_) => commands::session::auto_save(state),
        Err(e) => tracing::error!(error = %e, "turn task panicked"),
    }
}

fn prompt(out: &mut impl Write) -> std::io::Result<()> {
    write!(out, "\n> ")?;
    out.flush()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
