use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_API_BASE_URL: &str = "http://localhost:1337/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_UNLOCK_GRACE_PERIOD_MS: u64 = 500;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base URL of the requisitions backend (e.g. "https://erp.example.com/api")
    #[validate(url)]
    pub api_base_url: String,

    /// Bearer token forwarded to the backend, if any
    #[serde(default)]
    pub api_token: Option<String>,

    /// Per-request timeout against the backend (seconds)
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// Wait between an accepted unlock and the re-read of the requisition (milliseconds)
    #[serde(default = "default_unlock_grace_period_ms")]
    #[validate(range(max = 30000))]
    pub unlock_grace_period_ms: u64,

    /// Capacity of the domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            unlock_grace_period_ms: default_unlock_grace_period_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn unlock_grace_period(&self) -> Duration {
        Duration::from_millis(self.unlock_grace_period_ms)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_unlock_grace_period_ms() -> u64 {
    DEFAULT_UNLOCK_GRACE_PERIOD_MS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn profile_path(config_dir: &Path, profile: &str) -> String {
    config_dir.join(profile).to_string_lossy().into_owned()
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("requisition_core={},requisition_cli={}", level, level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::new(filter_directive);

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(true).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("api_base_url", DEFAULT_API_BASE_URL)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&profile_path(config_dir, "default")).required(false))
        .add_source(File::with_name(&profile_path(config_dir, &run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_dir(default_content: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("default.toml"), default_content).unwrap();
        dir
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.unlock_grace_period(), Duration::from_millis(500));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn missing_directory_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config_from(&dir.path().join("nope")).unwrap();
        assert_eq!(cfg.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(cfg.unlock_grace_period_ms, DEFAULT_UNLOCK_GRACE_PERIOD_MS);
    }

    #[test]
    fn file_overrides_grace_period() {
        let dir = config_dir(
            r#"
            api_base_url = "https://erp.example.com/api"
            unlock_grace_period_ms = 1200
            log_level = "debug"
            "#,
        );
        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.api_base_url, "https://erp.example.com/api");
        assert_eq!(cfg.unlock_grace_period(), Duration::from_millis(1200));
        assert_eq!(cfg.log_level(), "debug");
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = config_dir(
            r#"
            api_base_url = "not a url"
            log_level = "chatty"
            "#,
        );
        let result = load_config_from(dir.path());
        assert!(matches!(result, Err(AppConfigError::Validation(_))));

        if let Err(AppConfigError::Validation(errors)) = result {
            assert!(errors.field_errors().contains_key("api_base_url"));
            assert!(errors.field_errors().contains_key("log_level"));
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = config_dir(r#"jwt_secret = "leftover""#);
        assert!(matches!(
            load_config_from(dir.path()),
            Err(AppConfigError::Load(_))
        ));
    }
}
