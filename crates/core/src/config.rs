//! TOML-based configuration for Timeline Studio.
//!
//! Sensitive values (the backend API token, the Slack webhook URL) are stored
//! as `_env` fields that reference environment variable names. The actual
//! secrets are resolved at runtime via [`StudioConfig::resolve_env_vars`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::estimate::{BudgetPolicy, Pricing};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudioConfig {
    /// Studio backend connection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// GPU stats service.
    #[serde(default)]
    pub gpu: GpuConfig,

    /// Cost model constants.
    #[serde(default)]
    pub pricing: Pricing,

    /// Daily spend policy.
    #[serde(default)]
    pub budget: BudgetPolicy,

    /// Background polling.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Notification channels.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Initial selection state.
    #[serde(default)]
    pub studio: SelectionDefaults,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Studio backend (versioning service) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend REST API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable holding the API token.
    #[serde(default)]
    pub token_env: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_api_url() -> String {
    "http://127.0.0.1:8000/api".into()
}
fn default_timeout() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: None,
            timeout_secs: default_timeout(),
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// GPU stats
// ---------------------------------------------------------------------------

/// GPU stats service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Full URL of the GPU stats endpoint.
    #[serde(default = "default_gpu_stats_url")]
    pub stats_url: String,

    /// The local GPU counts as busy below this free-VRAM fraction.
    #[serde(default = "default_busy_fraction")]
    pub busy_free_fraction: f64,
}

fn default_gpu_stats_url() -> String {
    "http://127.0.0.1:8188/system_stats".into()
}
fn default_busy_fraction() -> f64 {
    0.30
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            stats_url: default_gpu_stats_url(),
            busy_free_fraction: default_busy_fraction(),
        }
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Background polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between training-job status refreshes (default 10).
    #[serde(default = "default_training_interval")]
    pub training_interval_secs: u64,
}

fn default_training_interval() -> u64 {
    10
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            training_interval_secs: default_training_interval(),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Notification channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationConfig {
    /// Environment variable holding the Slack incoming-webhook URL.
    #[serde(default)]
    pub slack_webhook_url_env: Option<String>,

    /// Resolved Slack webhook URL.
    #[serde(skip)]
    pub slack_webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Selection defaults
// ---------------------------------------------------------------------------

/// Initial project / branch selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionDefaults {
    #[serde(default)]
    pub project: Option<String>,

    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".into()
}

impl Default for SelectionDefaults {
    fn default() -> Self {
        Self {
            project: None,
            branch: default_branch(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl StudioConfig {
    /// Load a [`StudioConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: StudioConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables.
    ///
    /// Missing variables log a warning but do not fail.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        if let Some(ref env_name) = self.backend.token_env {
            self.backend.token = resolve_optional_env(env_name, "backend.token_env");
        }

        if let Some(ref env_name) = self.notifications.slack_webhook_url_env {
            self.notifications.slack_webhook_url =
                resolve_optional_env(env_name, "notifications.slack_webhook_url_env");
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.api_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "backend.api_url".into(),
                detail: "backend URL must not be empty".into(),
            });
        }
        if !self.backend.api_url.starts_with("http://")
            && !self.backend.api_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "backend.api_url".into(),
                detail: "backend URL must start with http:// or https://".into(),
            });
        }
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backend.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.gpu.busy_free_fraction) {
            return Err(ConfigError::InvalidValue {
                field: "gpu.busy_free_fraction".into(),
                detail: "must be between 0 and 1".into(),
            });
        }
        if self.polling.training_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "polling.training_interval_secs".into(),
                detail: "poll interval must be > 0".into(),
            });
        }
        if self.budget.daily_cap <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "budget.daily_cap".into(),
                detail: "daily cap must be > 0".into(),
            });
        }
        if self.studio.branch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "studio.branch".into(),
                detail: "default branch must not be empty".into(),
            });
        }
        self.pricing.validate()?;

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
