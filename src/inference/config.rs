//! Client configuration loading and validation.
//!
//! Reads `hf-serverless.yaml` and resolves environment variables, so the
//! access token can live in the environment instead of the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::InferenceError;

/// File name searched for by [`find_config_path`].
pub const CONFIG_FILE_NAME: &str = "hf-serverless.yaml";

/// Environment variable that points straight at a config file.
pub const CONFIG_PATH_ENV: &str = "HF_SERVERLESS_CONFIG";

pub const DEFAULT_API_URL: &str = "https://api-inference.huggingface.co/models/";
pub const DEFAULT_HUB_URL: &str = "https://huggingface.co/api/models";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Settings shared by every call made through one client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL the model id is appended to.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Model listing endpoint.
    #[serde(default = "default_hub_url")]
    pub hub_url: String,
    pub access_token: String,
    /// Default for the per-call cache directive.
    #[serde(default = "default_true")]
    pub use_cache: bool,
    /// Default for the per-call wait-for-model directive.
    #[serde(default)]
    pub wait_for_model: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Streaming responses can take minutes to finish on large models.
    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_secs: u64,
    /// Size of a [`TaskPool`](super::pool::TaskPool) built from this config.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
fn default_hub_url() -> String {
    DEFAULT_HUB_URL.to_string()
}
fn default_true() -> bool {
    true
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_stream_timeout_secs() -> u64 {
    180
}
fn default_max_workers() -> usize {
    4
}

impl ClientConfig {
    /// Defaults for everything except the access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            api_url: default_api_url(),
            hub_url: default_hub_url(),
            access_token: access_token.into(),
            use_cache: true,
            wait_for_model: false,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            stream_timeout_secs: default_stream_timeout_secs(),
            max_workers: default_max_workers(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_hub_url(mut self, hub_url: impl Into<String>) -> Self {
        self.hub_url = hub_url.into();
        self
    }

    /// Reject configurations that cannot produce a working client.
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.access_token.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "access_token is empty".into(),
            });
        }
        if self.api_url.trim().is_empty() || self.hub_url.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "api_url and hub_url must be set".into(),
            });
        }
        if self.max_workers == 0 {
            return Err(InferenceError::ConfigError {
                reason: "max_workers must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// URL of the task endpoint for `model_id`.
    pub fn model_url(&self, model_id: &str) -> String {
        if self.api_url.ends_with('/') {
            format!("{}{model_id}", self.api_url)
        } else {
            format!("{}/{model_id}", self.api_url)
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `HF_SERVERLESS_CONFIG` first, then searches upward from `start`
/// for `hf-serverless.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, InferenceError> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(InferenceError::ConfigError {
        reason: format!("could not find {CONFIG_FILE_NAME}"),
    })
}

/// Load, interpolate and validate the client configuration file.
///
/// String values may reference `${VAR_NAME}` or `${VAR_NAME:-default}`.
pub fn load_client_config(path: &Path) -> Result<ClientConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    parse_client_config(&raw)
}

/// Parse config YAML that is already in memory.
pub fn parse_client_config(raw: &str) -> Result<ClientConfig, InferenceError> {
    let interpolated = interpolate_env_vars(raw);

    let config: ClientConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    config.validate()?;
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
