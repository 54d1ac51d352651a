//! Application configuration loading.
//!
//! Reads an optional YAML file and resolves environment variables. Every field
//! has a default, so a missing file (or a file naming only a few keys) is fine.
//!
//! Lookup order for the file:
//! 1. `$OLLAMA_CHAT_CONFIG`
//! 2. `<config_dir>/ollama-chat/config.yaml`
//! 3. `./ollama-chat.yaml`

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::inference::InferenceError;

/// Default Ollama endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default market-data API root.
pub const DEFAULT_MARKET_DATA_URL: &str = "https://api.coingecko.com/api/v3";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level configuration (mirrors `config.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub inference: InferenceConfig,
    pub market_data: MarketDataConfig,
    pub history: HistoryConfig,
}

/// Inference endpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    /// Applies to every request, streaming included.
    pub connect_timeout_secs: u64,
    /// Total timeout for model listing.
    pub list_timeout_secs: u64,
    /// Model to select at startup when the server offers it.
    pub default_model: Option<String>,
    /// Prepended to every new conversation.
    pub system_prompt: Option<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("OLLAMA_HOST")
                .ok()
                .filter(|h| !h.trim().is_empty())
                .map(|h| normalize_host(&h))
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            connect_timeout_secs: 5,
            list_timeout_secs: 5,
            default_model: None,
            system_prompt: None,
        }
    }
}

/// Market-data tool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub vs_currency: String,
    /// Number of assets returned when the model doesn't ask for a count.
    pub limit: u32,
    pub timeout_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MARKET_DATA_URL.to_string(),
            vs_currency: "usd".to_string(),
            limit: 10,
            timeout_secs: 10,
        }
    }
}

/// Chat history settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Defaults to `~/.ollama_chat/history`.
    pub dir: Option<String>,
}

impl HistoryConfig {
    /// Resolve the history directory.
    pub fn resolve_dir(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => PathBuf::from(expand_home(dir)),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ollama_chat")
                .join("history"),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file, if any.
pub fn find_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("OLLAMA_CHAT_CONFIG") {
        let candidate = PathBuf::from(expand_home(&path));
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "OLLAMA_CHAT_CONFIG points to a missing file");
    }

    let candidates = [
        dirs::config_dir().map(|d| d.join("ollama-chat").join("config.yaml")),
        Some(PathBuf::from("ollama-chat.yaml")),
    ];
    candidates.into_iter().flatten().find(|p| p.exists())
}

/// Load and parse a configuration file.
///
/// Performs environment-variable interpolation on values matching
/// `${VAR_NAME}` or `${VAR_NAME:-default}`.
pub fn load_config(path: &Path) -> Result<AppConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    parse_config(&raw)
}

/// Parse configuration YAML (after interpolation) and validate it.
pub fn parse_config(raw: &str) -> Result<AppConfig, InferenceError> {
    let interpolated = interpolate_env_vars(raw);

    // An empty file deserializes to `null`; treat it as all-defaults.
    if interpolated.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    let mut config: AppConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    config.inference.base_url = normalize_host(&config.inference.base_url);
    validate(&config)?;
    Ok(config)
}

/// Load the config file if one exists, otherwise defaults.
///
/// A file that exists but can't be parsed is an error: silently ignoring it
/// would hide typos.
pub fn load_or_default() -> Result<AppConfig, InferenceError> {
    match find_config_path() {
        Some(path) => {
            let config = load_config(&path)?;
            tracing::info!(path = %path.display(), "loaded config");
            Ok(config)
        }
        None => {
            tracing::info!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

fn validate(config: &AppConfig) -> Result<(), InferenceError> {
    let base = &config.inference.base_url;
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(InferenceError::ConfigError {
            reason: format!("inference.base_url must be an http(s) URL, got '{base}'"),
        });
    }
    if config.inference.connect_timeout_secs == 0 || config.inference.list_timeout_secs == 0 {
        return Err(InferenceError::ConfigError {
            reason: "inference timeouts must be at least 1 second".into(),
        });
    }
    if config.market_data.limit == 0 {
        return Err(InferenceError::ConfigError {
            reason: "market_data.limit must be at least 1".into(),
        });
    }
    Ok(())
}

/// Accept `OLLAMA_HOST`-style values such as `127.0.0.1:11434`.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Substitute `${VAR}` and `${VAR:-default}` references.
///
/// An unterminated `${` is copied through unchanged.
fn interpolate_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let body = &rest[open + 2..];
        let Some(close) = body.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        out.push_str(&lookup_var(&body[..close]));
        rest = &body[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Shell semantics: the default applies when the variable is unset or empty.
fn lookup_var(expr: &str) -> String {
    let (name, default) = match expr.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (expr, None),
    };
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => default.map(expand_home).unwrap_or_default(),
    }
}

/// `~` or `~/...` → the home directory. `~user` forms are left alone.
fn expand_home(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            format!("{}{rest}", home.display())
        }
        _ => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__OLLAMA_CHAT_UNSET_VAR__");
        let input = "${__OLLAMA_CHAT_UNSET_VAR__:-/fallback/path}";
        assert_eq!(interpolate_env_vars(input), "/fallback/path");
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__OLLAMA_CHAT_TEST_VAR__", "/custom/path");
        let input = "${__OLLAMA_CHAT_TEST_VAR__:-/fallback/path}";
        assert_eq!(interpolate_env_vars(input), "/custom/path");
        std::env::remove_var("__OLLAMA_CHAT_TEST_VAR__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with no variables";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_interpolate_keeps_unterminated_reference() {
        assert_eq!(interpolate_env_vars("dir: ${HOME"), "dir: ${HOME");
    }

    #[test]
    fn test_empty_var_falls_back_to_default() {
        std::env::set_var("__OLLAMA_CHAT_EMPTY_VAR__", "");
        assert_eq!(interpolate_env_vars("${__OLLAMA_CHAT_EMPTY_VAR__:-usd}"), "usd");
        std::env::remove_var("__OLLAMA_CHAT_EMPTY_VAR__");
    }

    #[test]
    fn test_expand_home() {
        let result = expand_home("~/history");
        assert!(!result.starts_with('~'), "tilde should be expanded");
        assert!(result.ends_with("/history"));
        assert_eq!(expand_home("~alice/notes"), "~alice/notes");
        assert_eq!(expand_home("/abs/path"), "/abs/path");
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let yaml = r#"
            inference:
              base_url: "http://gpu-box:11434/"
              default_model: "llama3.2:3b"
        "#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.inference.base_url, "http://gpu-box:11434");
        assert_eq!(config.inference.default_model.as_deref(), Some("llama3.2:3b"));
        assert_eq!(config.inference.list_timeout_secs, 5);
        assert_eq!(config.market_data.limit, 10);
        assert_eq!(config.market_data.vs_currency, "usd");
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = parse_config("").unwrap();
        assert_eq!(config.market_data.base_url, DEFAULT_MARKET_DATA_URL);
    }

    #[test]
    fn test_bare_host_is_normalized() {
        let config = parse_config("inference:\n  base_url: 127.0.0.1:11434\n").unwrap();
        assert_eq!(config.inference.base_url, "http://127.0.0.1:11434");
    }

    #[test]
    fn test_zero_limit_rejected() {
        let result = parse_config("market_data:\n  limit: 0\n");
        assert!(matches!(result, Err(InferenceError::ConfigError { .. })));
    }

    #[test]
    fn test_unparseable_config_rejected() {
        let result = parse_config("inference: [unclosed");
        assert!(result.is_err());
    }

    #[test]
    fn test_history_dir_default() {
        let dir = HistoryConfig::default().resolve_dir();
        assert!(dir.ends_with(".ollama_chat/history"));
    }
}
