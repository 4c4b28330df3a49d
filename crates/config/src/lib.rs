//! Configuration loading, validation, and management for JobRelay.
//!
//! Loads configuration from `~/.jobrelay/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.jobrelay/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Messenger platform webhook settings
    #[serde(default)]
    pub messenger: MessengerConfig,

    /// Context session store
    #[serde(default)]
    pub store: StoreConfig,

    /// Outbound automation endpoint
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Defaults for issuing new context sessions
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum accepted webhook body size
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct MessengerConfig {
    /// Token echoed back during the platform's subscription handshake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_token: Option<String>,

    /// App secret used to check `X-Hub-Signature-256`. Unset = no validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
}

impl std::fmt::Debug for MessengerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessengerConfig")
            .field("verify_token", &redact(&self.verify_token))
            .field("app_secret", &redact(&self.app_secret))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database file (defaults to `~/.jobrelay/sessions.db`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// The SQLite database path, falling back to the config directory.
    pub fn database_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("sessions.db"))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Automation webhook URL. Unset = envelopes are logged and dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    /// Upper bound on a single delivery attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional HMAC-SHA256 key for signing outbound envelopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            timeout_secs: default_timeout_secs(),
            signing_secret: None,
        }
    }
}

impl std::fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("signing_secret", &redact(&self.signing_secret))
            .finish()
    }
}

/// Longest session lifetime accepted anywhere a TTL is configured (ten years).
pub const MAX_TTL_HOURS: i64 = 24 * 365 * 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_ttl_hours")]
    pub default_ttl_hours: i64,
}

fn default_ttl_hours() -> i64 {
    72
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: default_ttl_hours(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.jobrelay/config.toml).
    ///
    /// Environment variables override the file:
    /// - `JOBRELAY_DISPATCH_URL`
    /// - `JOBRELAY_VERIFY_TOKEN`
    /// - `JOBRELAY_APP_SECRET`
    /// - `JOBRELAY_STORE_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("JOBRELAY_DISPATCH_URL") {
            self.dispatch.endpoint_url = Some(url);
        }
        if let Ok(token) = std::env::var("JOBRELAY_VERIFY_TOKEN") {
            self.messenger.verify_token = Some(token);
        }
        if let Ok(secret) = std::env::var("JOBRELAY_APP_SECRET") {
            self.messenger.app_secret = Some(secret);
        }
        if let Ok(path) = std::env::var("JOBRELAY_STORE_PATH") {
            self.store.path = Some(path);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".jobrelay")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=120).contains(&self.dispatch.timeout_secs) {
            return Err(ConfigError::ValidationError(
                "dispatch.timeout_secs must be between 1 and 120".into(),
            ));
        }

        if let Some(url) = &self.dispatch.endpoint_url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            return Err(ConfigError::ValidationError(format!(
                "dispatch.endpoint_url must be an http(s) URL, got '{url}'"
            )));
        }

        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be \"sqlite\" or \"memory\", got '{}'",
                self.store.backend
            )));
        }

        if !(1..=MAX_TTL_HOURS).contains(&self.sessions.default_ttl_hours) {
            return Err(ConfigError::ValidationError(format!(
                "sessions.default_ttl_hours must be between 1 and {MAX_TTL_HOURS}"
            )));
        }

        if self.gateway.body_limit_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.body_limit_bytes must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 42618);
        assert_eq!(config.dispatch.timeout_secs, 10);
        assert_eq!(config.store.backend, "sqlite");
        assert!(config.dispatch.endpoint_url.is_none());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.sessions.default_ttl_hours, 72);
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.dispatch.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_http_endpoint_rejected() {
        let mut config = AppConfig::default();
        config.dispatch.endpoint_url = Some("ftp://automation.local/hook".into());
        assert!(config.validate().is_err());

        config.dispatch.endpoint_url = Some("https://n8n.example.com/webhook/abc".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ttl_bounds_enforced() {
        let mut config = AppConfig::default();
        config.sessions.default_ttl_hours = 0;
        assert!(config.validate().is_err());

        config.sessions.default_ttl_hours = 3_000_000_000;
        assert!(config.validate().is_err());

        config.sessions.default_ttl_hours = MAX_TTL_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_store_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "mongo".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().gateway.host, "127.0.0.1");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[dispatch]
endpoint_url = "https://n8n.example.com/webhook/messenger"
timeout_secs = 5

[messenger]
verify_token = "let-me-in"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.dispatch.timeout_secs, 5);
        assert_eq!(config.messenger.verify_token.as_deref(), Some("let-me-in"));
        assert_eq!(config.gateway.port, 42618);
        assert_eq!(config.store.backend, "sqlite");
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway\nport = 1").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.messenger.app_secret = Some("super-secret".into());
        config.dispatch.signing_secret = Some("hmac-key".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("hmac-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("42618"));
        assert!(toml_str.contains("sqlite"));
    }

    #[test]
    fn store_path_defaults_to_config_dir() {
        let config = StoreConfig::default();
        assert!(config.database_path().ends_with("sessions.db"));
    }
}
