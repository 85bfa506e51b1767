//! Configuration management for Relaybox
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! Precedence, lowest first: built-in defaults, YAML file, `RELAYBOX_*`
//! environment variables, command-line flags.

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Relaybox
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend API settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Authentication handshake settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Feed synchronization settings
    #[serde(default)]
    pub sync: SyncConfig,
    /// Compose box settings
    #[serde(default)]
    pub compose: ComposeConfig,
    /// Diagnostic telemetry settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the init credential travels on feed GET requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialTransport {
    /// `?initData=<credential>` query parameter
    #[default]
    Query,
    /// `X-Telegram-Init-Data: <credential>` header
    Header,
}

impl std::str::FromStr for CredentialTransport {
    type Err = RelayError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "query" => Ok(Self::Query),
            "header" => Ok(Self::Header),
            other => Err(RelayError::Config(format!(
                "Invalid credential transport: {}. Must be one of: query, header",
                other
            ))),
        }
    }
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the relay backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Optional per-request timeout (seconds); unset means no timeout
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// How feed requests carry the init credential
    #[serde(default)]
    pub credential_transport: CredentialTransport,

    /// Endpoint paths relative to `base_url`
    #[serde(default)]
    pub endpoints: Endpoints,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: None,
            credential_transport: CredentialTransport::default(),
            endpoints: Endpoints::default(),
        }
    }
}

/// Endpoint paths of the relay backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub auth: String,
    pub inbox: String,
    pub sent: String,
    pub send: String,
    pub reply: String,
    pub stats: String,
    pub users: String,
    pub log: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth: "/api/auth".to_string(),
            inbox: "/api/messages/inbox".to_string(),
            sent: "/api/messages/sent".to_string(),
            send: "/api/send".to_string(),
            reply: "/api/admin/reply".to_string(),
            stats: "/api/admin/stats".to_string(),
            users: "/api/admin/users".to_string(),
            log: "/api/log".to_string(),
        }
    }
}

/// Transport shape of one authentication attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// `GET <auth>?initData=...`
    QueryGet,
    /// `POST <auth>` with a JSON body
    JsonPost,
    /// `POST <auth>` with a form-encoded body
    FormPost,
}

impl StrategyKind {
    /// Stable name used in logs, metrics and config
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryGet => "query_get",
            Self::JsonPost => "json_post",
            Self::FormPost => "form_post",
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = RelayError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "query_get" => Ok(Self::QueryGet),
            "json_post" => Ok(Self::JsonPost),
            "form_post" => Ok(Self::FormPost),
            other => Err(RelayError::Config(format!(
                "Invalid auth strategy: {}. Must be one of: query_get, json_post, form_post",
                other
            ))),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Strategies tried in order until one succeeds
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyKind>,

    /// Extra rounds over the whole strategy list after all of them failed
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base delay between rounds; doubles each round (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_strategies() -> Vec<StrategyKind> {
    vec![
        StrategyKind::JsonPost,
        StrategyKind::QueryGet,
        StrategyKind::FormPost,
    ]
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// When activating a tab triggers a fetch of its feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Only the first activation of a never-loaded feed fetches it
    #[default]
    Lazy,
    /// Every activation fetches
    Eager,
}

impl std::str::FromStr for LoadPolicy {
    type Err = RelayError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lazy" => Ok(Self::Lazy),
            "eager" => Ok(Self::Eager),
            other => Err(RelayError::Config(format!(
                "Invalid load policy: {}. Must be one of: lazy, eager",
                other
            ))),
        }
    }
}

/// Feed synchronization configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Tab activation fetch policy
    #[serde(default)]
    pub load_policy: LoadPolicy,
}

/// Compose box configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Advisory length ceiling shown in the counter (UTF-16 units)
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Length at which the counter switches to its warning state
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: usize,
}

fn default_max_length() -> usize {
    4096
}

fn default_warn_threshold() -> usize {
    4000
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            warn_threshold: default_warn_threshold(),
        }
    }
}

/// Diagnostic telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Send diagnostic events to the backend log endpoint
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,
}

fn default_telemetry_enabled() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "relaybox=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error: defaults are used instead.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command-line arguments
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the file exists but cannot be read
    /// or parsed.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("RELAYBOX_BASE_URL") {
            self.api.base_url = base_url;
        }

        if let Ok(timeout) = std::env::var("RELAYBOX_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.api.timeout_seconds = Some(value);
            } else {
                tracing::warn!("Invalid RELAYBOX_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(transport) = std::env::var("RELAYBOX_CREDENTIAL_TRANSPORT") {
            match transport.parse() {
                Ok(value) => self.api.credential_transport = value,
                Err(e) => tracing::warn!("Ignoring RELAYBOX_CREDENTIAL_TRANSPORT: {}", e),
            }
        }

        if let Ok(strategies) = std::env::var("RELAYBOX_AUTH_STRATEGIES") {
            let parsed: std::result::Result<Vec<StrategyKind>, _> = strategies
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse)
                .collect();
            match parsed {
                Ok(list) if !list.is_empty() => self.auth.strategies = list,
                Ok(_) => tracing::warn!("RELAYBOX_AUTH_STRATEGIES is empty, keeping configured list"),
                Err(e) => tracing::warn!("Ignoring RELAYBOX_AUTH_STRATEGIES: {}", e),
            }
        }

        if let Ok(retries) = std::env::var("RELAYBOX_AUTH_RETRY_ATTEMPTS") {
            if let Ok(value) = retries.parse() {
                self.auth.retry_attempts = value;
            } else {
                tracing::warn!("Invalid RELAYBOX_AUTH_RETRY_ATTEMPTS: {}", retries);
            }
        }

        if let Ok(policy) = std::env::var("RELAYBOX_LOAD_POLICY") {
            match policy.parse() {
                Ok(value) => self.sync.load_policy = value,
                Err(e) => tracing::warn!("Ignoring RELAYBOX_LOAD_POLICY: {}", e),
            }
        }

        if let Ok(enabled) = std::env::var("RELAYBOX_TELEMETRY") {
            match parse_bool(&enabled) {
                Some(value) => self.telemetry.enabled = value,
                None => tracing::warn!("Invalid RELAYBOX_TELEMETRY: {}", enabled),
            }
        }

        if let Ok(json) = std::env::var("RELAYBOX_LOG_JSON") {
            match parse_bool(&json) {
                Some(value) => self.logging.json_format = value,
                None => tracing::warn!("Invalid RELAYBOX_LOG_JSON: {}", json),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.base_url {
            self.api.base_url = base_url.clone();
        }
        if cli.verbose {
            self.logging.level = "relaybox=debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = url::Url::parse(&self.api.base_url) {
            return Err(RelayError::Config(format!(
                "Invalid api.base_url {}: {}",
                self.api.base_url, e
            ))
            .into());
        }

        if self.api.timeout_seconds == Some(0) {
            return Err(RelayError::Config(
                "api.timeout_seconds must be greater than 0 when set".to_string(),
            )
            .into());
        }

        if self.auth.strategies.is_empty() {
            return Err(
                RelayError::Config("auth.strategies cannot be empty".to_string()).into(),
            );
        }

        let mut seen = std::collections::HashSet::new();
        for strategy in &self.auth.strategies {
            if !seen.insert(strategy) {
                return Err(RelayError::Config(format!(
                    "auth.strategies lists {} more than once",
                    strategy.as_str()
                ))
                .into());
            }
        }

        if self.auth.retry_attempts > 10 {
            return Err(RelayError::Config(
                "auth.retry_attempts must be less than or equal to 10".to_string(),
            )
            .into());
        }

        if self.compose.max_length == 0 {
            return Err(RelayError::Config(
                "compose.max_length must be greater than 0".to_string(),
            )
            .into());
        }

        if self.compose.warn_threshold > self.compose.max_length {
            return Err(RelayError::Config(
                "compose.warn_threshold must not exceed compose.max_length".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
