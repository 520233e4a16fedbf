//! Configuration system for specauth
//!
//! Loads configuration from TOML files; credential values themselves never
//! live here (they come from the environment, a secrets file or a prompt).

mod types;

pub use types::*;

use crate::client::ClientOptions;
use crate::credentials::DEFAULT_RESOLUTION_TIMEOUT;
use crate::router::RequirementMode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use url::Url;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main specauth configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Where the OpenAPI document comes from
    pub spec: SpecConfig,
    /// Authentication behaviour
    pub auth: AuthConfig,
    /// Credential sources
    pub credentials: CredentialsConfig,
    /// Outgoing HTTP client
    pub client: ClientConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Load configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Self::from_raw(raw)
    }

    /// Convert from raw TOML config to validated config
    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            spec: raw.spec.unwrap_or_default().try_into()?,
            auth: raw.auth.unwrap_or_default().try_into()?,
            credentials: raw.credentials.unwrap_or_default().try_into()?,
            client: raw.client.unwrap_or_default().into(),
            logging: raw.logging.unwrap_or_default().into(),
        })
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("specauth")
            .join("config.toml")
    }

    /// Get the default secrets file path
    pub fn default_store_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("specauth")
            .join("secrets.toml")
    }

    /// Default configuration file contents written by `specauth init`
    pub fn template() -> &'static str {
        DEFAULT_CONFIG_TEMPLATE
    }
}

/// Spec source configuration
#[derive(Debug, Clone, Default)]
pub struct SpecConfig {
    /// File path or http(s) URL of the OpenAPI document
    pub source: Option<String>,
    /// Overrides `servers[0].url`
    pub base_url: Option<Url>,
}

/// Authentication behaviour
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthConfig {
    /// How multiple requirement sets combine
    pub requirement_mode: RequirementMode,
}

/// A credential source named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Environment variables
    Env,
    /// Secrets file
    Store,
    /// Terminal prompt (priming only)
    Prompt,
}

/// Credential source configuration
#[derive(Debug, Clone)]
pub struct CredentialsConfig {
    /// Sources tried in order
    pub sources: Vec<SourceKind>,
    /// Environment variable prefix
    pub env_prefix: String,
    /// Secrets file for the `store` source
    pub store_path: PathBuf,
    /// Bound on one non-interactive resolution
    pub resolution_timeout: Option<Duration>,
    /// Attempts for transient secret-store failures
    pub store_retries: u32,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            sources: vec![SourceKind::Env, SourceKind::Store, SourceKind::Prompt],
            env_prefix: crate::credentials::DEFAULT_ENV_PREFIX.to_string(),
            store_path: Config::default_store_path(),
            resolution_timeout: Some(DEFAULT_RESOLUTION_TIMEOUT),
            store_retries: 3,
        }
    }
}

/// Outgoing HTTP client configuration
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub options: ClientOptions,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Format: "json" or "pretty"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format
    Pretty,
    /// JSON format
    Json,
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# specauth configuration

[spec]
# File path or http(s) URL of the OpenAPI document
# source = "https://api.example.com/openapi.json"
# base_url = "https://api.example.com"

[auth]
# apply_all: apply every scheme of every requirement set
# first_satisfiable: apply only the first fully resolvable set
requirement_mode = "apply_all"

[credentials]
sources = ["env", "store", "prompt"]
env_prefix = "SPECAUTH_"
# store_path = "~/.config/specauth/secrets.toml"
resolution_timeout_secs = 30
store_retries = 3

[client]
timeout_secs = 30

[logging]
level = "info"
format = "pretty"
"#;
