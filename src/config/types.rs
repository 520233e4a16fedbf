//! Raw configuration types for TOML parsing

use super::*;
use serde::Deserialize;

/// Raw configuration as parsed from TOML
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub spec: Option<RawSpecConfig>,
    pub auth: Option<RawAuthConfig>,
    pub credentials: Option<RawCredentialsConfig>,
    pub client: Option<RawClientConfig>,
    pub logging: Option<RawLoggingConfig>,
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawSpecConfig {
    pub source: Option<String>,
    pub base_url: Option<String>,
}

impl TryFrom<RawSpecConfig> for SpecConfig {
    type Error = ConfigError;

    fn try_from(raw: RawSpecConfig) -> Result<Self, Self::Error> {
        let base_url = raw
            .base_url
            .map(|u| {
                Url::parse(&u)
                    .map_err(|e| ConfigError::Invalid(format!("Invalid base_url '{}': {}", u, e)))
            })
            .transpose()?;

        Ok(Self {
            source: raw.source.filter(|s| !s.trim().is_empty()),
            base_url,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawAuthConfig {
    pub requirement_mode: Option<String>,
}

impl TryFrom<RawAuthConfig> for AuthConfig {
    type Error = ConfigError;

    fn try_from(raw: RawAuthConfig) -> Result<Self, Self::Error> {
        let requirement_mode = match raw.requirement_mode {
            Some(mode) => mode.parse().map_err(ConfigError::Invalid)?,
            None => RequirementMode::default(),
        };

        Ok(Self { requirement_mode })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawCredentialsConfig {
    pub sources: Option<Vec<String>>,
    pub env_prefix: Option<String>,
    pub store_path: Option<String>,
    pub resolution_timeout_secs: Option<u64>,
    pub store_retries: Option<u32>,
}

impl TryFrom<RawCredentialsConfig> for CredentialsConfig {
    type Error = ConfigError;

    fn try_from(raw: RawCredentialsConfig) -> Result<Self, Self::Error> {
        let defaults = CredentialsConfig::default();

        let sources = match raw.sources {
            Some(names) => names
                .iter()
                .map(|name| match name.as_str() {
                    "env" => Ok(SourceKind::Env),
                    "store" => Ok(SourceKind::Store),
                    "prompt" => Ok(SourceKind::Prompt),
                    other => Err(ConfigError::Invalid(format!(
                        "Unknown credential source: {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.sources,
        };

        if sources.is_empty() {
            return Err(ConfigError::Invalid(
                "At least one credential source is required".to_string(),
            ));
        }

        // 0 disables the bound
        let resolution_timeout = match raw.resolution_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.resolution_timeout,
        };

        Ok(Self {
            sources,
            env_prefix: raw.env_prefix.unwrap_or(defaults.env_prefix),
            store_path: raw
                .store_path
                .map(|p| expand_home(&p))
                .unwrap_or(defaults.store_path),
            resolution_timeout,
            store_retries: raw.store_retries.unwrap_or(defaults.store_retries).max(1),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawClientConfig {
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

impl From<RawClientConfig> for ClientConfig {
    fn from(raw: RawClientConfig) -> Self {
        let defaults = ClientOptions::default();
        Self {
            options: ClientOptions {
                timeout: match raw.timeout_secs {
                    Some(0) => None,
                    Some(secs) => Some(Duration::from_secs(secs)),
                    None => defaults.timeout,
                },
                user_agent: raw.user_agent.unwrap_or(defaults.user_agent),
            },
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl From<RawLoggingConfig> for LoggingConfig {
    fn from(raw: RawLoggingConfig) -> Self {
        Self {
            level: raw.level.unwrap_or_else(|| "info".to_string()),
            format: match raw.format.as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[spec]
source = "https://api.example.com/openapi.json"
base_url = "https://staging.example.com/v2"

[auth]
requirement_mode = "first_satisfiable"

[credentials]
sources = ["env", "store"]
env_prefix = "PETSTORE_"
store_path = "/etc/specauth/secrets.toml"
resolution_timeout_secs = 5
store_retries = 0

[client]
timeout_secs = 0
user_agent = "test-agent"

[logging]
level = "debug"
format = "json"
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(
            config.spec.source.as_deref(),
            Some("https://api.example.com/openapi.json")
        );
        assert_eq!(config.spec.base_url.unwrap().path(), "/v2");
        assert_eq!(
            config.auth.requirement_mode,
            RequirementMode::FirstSatisfiable
        );
        assert_eq!(
            config.credentials.sources,
            vec![SourceKind::Env, SourceKind::Store]
        );
        assert_eq!(config.credentials.env_prefix, "PETSTORE_");
        assert_eq!(
            config.credentials.store_path,
            PathBuf::from("/etc/specauth/secrets.toml")
        );
        assert_eq!(
            config.credentials.resolution_timeout,
            Some(Duration::from_secs(5))
        );
        assert_eq!(config.credentials.store_retries, 1);
        assert_eq!(config.client.options.timeout, None);
        assert_eq!(config.client.options.user_agent, "test-agent");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_minimal_config() {
        let config = Config::parse("").unwrap();
        assert!(config.spec.source.is_none());
        assert_eq!(config.auth.requirement_mode, RequirementMode::ApplyAll);
        assert_eq!(config.credentials.sources.len(), 3);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_template_parses() {
        let config = Config::parse(Config::template()).unwrap();
        assert_eq!(config.credentials.env_prefix, "SPECAUTH_");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::parse("[auth]\nrequirement_mode = \"any\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[credentials]\nsources = [\"vault\"]"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[credentials]\nsources = []"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[spec]\nbase_url = \"not a url\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[spec"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
