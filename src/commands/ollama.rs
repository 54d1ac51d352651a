//! Commands for the Ollama server: connection check, model listing, and
//! model selection.

use std::io::Write;

use super::AppState;

/// Probe the server. Unreachable is a warning, not an error: the next
/// action retries.
pub async fn check_connection(state: &AppState, out: &mut impl Write) -> std::io::Result<bool> {
    if state.client.is_available().await {
        writeln!(out, "Connected to Ollama at {}", state.client.base_url())?;
        return Ok(true);
    }

    tracing::warn!(base_url = %state.client.base_url(), "Ollama server not available");
    writeln!(
        out,
        "Warning: cannot connect to Ollama at {}.\n\
         Please make sure Ollama is installed and running:\n  ollama serve",
        state.client.base_url()
    )?;
    Ok(false)
}

/// Re-list models and keep the selection valid.
///
/// Keeps the current model if the server still offers it; otherwise picks
/// the configured default, then the first listed model. Returns whether a
/// model is selected afterwards.
pub async fn refresh_models(state: &AppState, out: &mut impl Write) -> std::io::Result<bool> {
    let models = match state.client.list_models().await {
        Ok(models) => models,
        Err(e) => {
            tracing::warn!(error = %e, "model listing failed");
            writeln!(out, "[Error: {e}]")?;
            if e.is_unreachable() {
                writeln!(out, "Start the server with:\n  ollama serve")?;
            }
            return Ok(state.session.selected_model().is_some());
        }
    };

    if models.is_empty() {
        writeln!(out, "No Ollama models found. Pull a model first:\n  ollama pull llama3.2")?;
        state.set_models(models);
        return Ok(false);
    }

    let offered = |name: &str| models.iter().any(|m| m.name == name);
    let current = state.session.selected_model().filter(|m| offered(m.as_str()));
    let selected = match current {
        Some(model) => model,
        None => {
            let model = state
                .config
                .inference
                .default_model
                .clone()
                .filter(|m| offered(m.as_str()))
                .unwrap_or_else(|| models[0].name.clone());
            state.session.select_model(model.clone());
            model
        }
    };

    writeln!(out, "Found {} model(s). Using {selected}.", models.len())?;
    state.set_models(models);
    Ok(true)
}

/// `/models`: refresh, then print the list with the current one marked.
pub async fn list_models(state: &AppState, out: &mut impl Write) -> std::io::Result<()> {
    if !refresh_models(state, out).await? && state.models().is_empty() {
        return Ok(());
    }
    let selected = state.session.selected_model();
    for model in state.models() {
        let marker = if selected.as_deref() == Some(model.name.as_str()) {
            "*"
        } else {
            " "
        };
        writeln!(out, " {marker} {}", model.name)?;
    }
    Ok(())
}

/// `/model <name>`: select a model.
///
/// Names not in the last listing are accepted with a warning, since the
/// listing may be stale.
pub fn select_model(state: &AppState, name: &str, out: &mut impl Write) -> std::io::Result<()> {
    let known = state.models();
    if !known.is_empty() && !known.iter().any(|m| m.name == name) {
        writeln!(out, "Warning: '{name}' was not in the last model listing (see /models).")?;
    }
    state.session.select_model(name);
    writeln!(out, "Using {name}.")
}

// ─── Tests ───────────────────────────────────────────────────────────────────
