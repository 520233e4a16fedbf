//! Built-in credential sources

use super::{CredentialSource, ResolutionError};
use crate::spec::SecurityScheme;
use crate::Secret;
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tracing::debug;

/// Default prefix for environment-variable credentials
pub const DEFAULT_ENV_PREFIX: &str = "SPECAUTH_";

type PromptFn = dyn Fn(&str) -> io::Result<String> + Send + Sync;

/// Asks for the credential at the terminal with masked input
pub struct PromptSource {
    reader: Arc<PromptFn>,
}

impl PromptSource {
    /// Prompt on the controlling terminal
    pub fn new() -> Self {
        Self {
            reader: Arc::new(|prompt: &str| rpassword::prompt_password(prompt)),
        }
    }

    /// Use a custom reader instead of the terminal
    pub fn with_reader<F>(reader: F) -> Self
    where
        F: Fn(&str) -> io::Result<String> + Send + Sync + 'static,
    {
        Self {
            reader: Arc::new(reader),
        }
    }

    /// Prompt text shown for a scheme
    pub fn prompt_for(scheme: &SecurityScheme) -> String {
        format!(
            "Enter credential for '{}' ({}): ",
            scheme.name,
            scheme.describe()
        )
    }
}

impl Default for PromptSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialSource for PromptSource {
    fn name(&self) -> &str {
        "prompt"
    }

    fn is_interactive(&self) -> bool {
        true
    }

    async fn resolve(&self, scheme: &SecurityScheme) -> Result<Secret, ResolutionError> {
        let prompt = Self::prompt_for(scheme);
        let reader = self.reader.clone();

        let input = tokio::task::spawn_blocking(move || reader(&prompt))
            .await
            .map_err(|e| ResolutionError::Unavailable(format!("prompt task failed: {}", e)))??;

        let input = input.trim_end_matches(['\r', '\n']);
        if input.is_empty() {
            return Err(ResolutionError::NotFound(scheme.name.clone()));
        }
        Ok(Secret::new(input))
    }
}

/// Environment variable name for a scheme: prefix + upper-cased name,
/// with every non-alphanumeric character replaced by `_`
pub fn env_var_name(prefix: &str, scheme_name: &str) -> String {
    let suffix: String = scheme_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", prefix, suffix)
}

/// Reads credentials from environment variables
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    /// Create a source with the given variable prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Variable consulted for a scheme
    pub fn var_name(&self, scheme: &SecurityScheme) -> String {
        env_var_name(&self.prefix, &scheme.name)
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new(DEFAULT_ENV_PREFIX)
    }
}

#[async_trait]
impl CredentialSource for EnvSource {
    fn name(&self) -> &str {
        "env"
    }

    async fn resolve(&self, scheme: &SecurityScheme) -> Result<Secret, ResolutionError> {
        let var = self.var_name(scheme);
        match std::env::var(&var) {
            Ok(value) if !value.is_empty() => Ok(Secret::new(value)),
            _ => {
                debug!(scheme = %scheme.name, var = %var, "Credential not set in environment");
                Err(ResolutionError::NotFound(scheme.name.clone()))
            }
        }
    }
}

/// Tries each source in order; the first success wins
pub struct ChainSource {
    sources: Vec<Arc<dyn CredentialSource>>,
}

impl ChainSource {
    /// Create a chain from sources in priority order
    pub fn new(sources: Vec<Arc<dyn CredentialSource>>) -> Self {
        Self { sources }
    }

    /// The same chain without interactive members
    pub fn non_interactive(&self) -> Self {
        Self {
            sources: self
                .sources
                .iter()
                .filter(|s| !s.is_interactive())
                .cloned()
                .collect(),
        }
    }

    /// Number of sources in the chain
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the chain has no sources
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl CredentialSource for ChainSource {
    fn name(&self) -> &str {
        "chain"
    }

    fn is_interactive(&self) -> bool {
        self.sources.iter().any(|s| s.is_interactive())
    }

    async fn resolve(&self, scheme: &SecurityScheme) -> Result<Secret, ResolutionError> {
        let mut last_err = None;
        for source in &self.sources {
            match source.resolve(scheme).await {
                Ok(secret) if secret.is_empty() => {
                    debug!(scheme = %scheme.name, source = %source.name(), "Source returned an empty credential");
                    last_err = Some(ResolutionError::NotFound(scheme.name.clone()));
                }
                Ok(secret) => {
                    debug!(scheme = %scheme.name, source = %source.name(), "Resolved credential");
                    return Ok(secret);
                }
                Err(e) => {
                    debug!(scheme = %scheme.name, source = %source.name(), error = %e, "Source could not resolve credential");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ResolutionError::NotFound(scheme.name.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn scheme(name: &str, value: serde_json::Value) -> SecurityScheme {
        SecurityScheme::from_value(name, &value).unwrap()
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("SPECAUTH_", "apiKeyScheme"), "SPECAUTH_APIKEYSCHEME");
        assert_eq!(env_var_name("X_", "petstore-auth.v2"), "X_PETSTORE_AUTH_V2");
    }

    #[tokio::test]
    async fn test_env_source() {
        let s = scheme("envTestScheme", json!({"type": "http", "scheme": "bearer"}));
        let source = EnvSource::new("SPECAUTH_TEST_ENV_SOURCE_");

        assert!(source.resolve(&s).await.is_err());

        std::env::set_var("SPECAUTH_TEST_ENV_SOURCE_ENVTESTSCHEME", "from-env");
        assert_eq!(source.resolve(&s).await.unwrap().expose(), "from-env");
        std::env::remove_var("SPECAUTH_TEST_ENV_SOURCE_ENVTESTSCHEME");
    }

    #[tokio::test]
    async fn test_prompt_text_and_trimming() {
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_by_reader = seen.clone();
        let source = PromptSource::with_reader(move |prompt| {
            *seen_by_reader.lock().unwrap() = prompt.to_string();
            Ok("typed-key\n".to_string())
        });

        let s = scheme(
            "apiKeyScheme",
            json!({"type": "apiKey", "in": "header", "name": "X-Key"}),
        );
        assert!(source.is_interactive());
        assert_eq!(source.resolve(&s).await.unwrap().expose(), "typed-key");
        assert_eq!(
            *seen.lock().unwrap(),
            "Enter credential for 'apiKeyScheme' (API key for header: 'X-Key'): "
        );
    }

    #[tokio::test]
    async fn test_prompt_empty_input_is_not_found() {
        let source = PromptSource::with_reader(|_| Ok(String::new()));
        let s = scheme("b", json!({"type": "http", "scheme": "basic"}));
        assert!(matches!(
            source.resolve(&s).await,
            Err(ResolutionError::NotFound(_))
        ));
    }

    /// Always answers with the same value
    struct FixedSource(&'static str);

    #[async_trait]
    impl CredentialSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn resolve(&self, _scheme: &SecurityScheme) -> Result<Secret, ResolutionError> {
            Ok(Secret::new(self.0))
        }
    }

    #[tokio::test]
    async fn test_chain_skips_empty_credentials() {
        let chain = ChainSource::new(vec![
            Arc::new(FixedSource("")) as Arc<dyn CredentialSource>,
            Arc::new(FixedSource("second")),
        ]);
        let s = scheme("blank", json!({"type": "http", "scheme": "bearer"}));
        assert_eq!(chain.resolve(&s).await.unwrap().expose(), "second");

        let only_empty =
            ChainSource::new(vec![Arc::new(FixedSource("")) as Arc<dyn CredentialSource>]);
        assert!(matches!(
            only_empty.resolve(&s).await,
            Err(ResolutionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_chain_falls_through_and_filters_interactive() {
        let prompt: Arc<dyn CredentialSource> =
            Arc::new(PromptSource::with_reader(|_| Ok("prompted".to_string())));
        let env: Arc<dyn CredentialSource> = Arc::new(EnvSource::new("SPECAUTH_TEST_CHAIN_"));
        let chain = ChainSource::new(vec![env, prompt]);

        let s = scheme("chained", json!({"type": "http", "scheme": "bearer"}));
        assert!(chain.is_interactive());
        assert_eq!(chain.resolve(&s).await.unwrap().expose(), "prompted");

        let quiet = chain.non_interactive();
        assert_eq!(quiet.len(), 1);
        assert!(!quiet.is_interactive());
        assert!(quiet.resolve(&s).await.is_err());
    }
}
