//! External secret stores as a credential source
//!
//! A [`SecretStore`] is an opaque key/value lookup (a vault, a keychain, a
//! secrets file). [`SecretStoreSource`] adapts one into a
//! [`CredentialSource`], retrying lookups that fail transiently.

use super::{CredentialSource, ResolutionError};
use crate::spec::SecurityScheme;
use crate::Secret;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Secret store errors
#[derive(Error, Debug)]
pub enum SecretStoreError {
    #[error("Secret store temporarily unavailable: {0}")]
    Transient(String),

    #[error("Secret store error: {0}")]
    Permanent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse secrets file: {0}")]
    Parse(String),
}

impl SecretStoreError {
    /// Whether retrying the same lookup may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SecretStoreError::Transient(_))
    }
}

/// Key/value lookup of secrets, keyed by scheme name
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the secret stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Secret>, SecretStoreError>;
}

/// Secrets read from a TOML or JSON file of `name = "value"` pairs
pub struct FileSecretStore {
    path: PathBuf,
    secrets: RwLock<HashMap<String, Secret>>,
}

impl FileSecretStore {
    /// Open and load a secrets file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SecretStoreError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            secrets: RwLock::new(HashMap::new()),
        };
        store.reload().await?;
        Ok(store)
    }

    /// Re-read the file from disk
    pub async fn reload(&self) -> Result<usize, SecretStoreError> {
        let content = fs::read_to_string(&self.path).await?;
        let parsed = parse_secrets(&self.path, &content)?;
        let count = parsed.len();
        *self.secrets.write() = parsed;
        debug!(path = %self.path.display(), count, "Loaded secrets file");
        Ok(count)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_secrets(path: &Path, content: &str) -> Result<HashMap<String, Secret>, SecretStoreError> {
    let raw: HashMap<String, String> = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(content).map_err(|e| SecretStoreError::Parse(e.to_string()))?
    } else {
        toml::from_str(content).map_err(|e| SecretStoreError::Parse(e.to_string()))?
    };

    Ok(raw.into_iter().map(|(k, v)| (k, Secret::new(v))).collect())
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, SecretStoreError> {
        Ok(self.secrets.read().get(key).cloned())
    }
}

/// Adapts a [`SecretStore`] to a [`CredentialSource`] with bounded retries
pub struct SecretStoreSource {
    store: Arc<dyn SecretStore>,
    max_attempts: u32,
    backoff: Duration,
}

impl SecretStoreSource {
    /// Wrap a store with the default retry policy (3 attempts, 100ms linear backoff)
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }

    /// Set the retry policy; `max_attempts` is clamped to at least one
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl CredentialSource for SecretStoreSource {
    fn name(&self) -> &str {
        "store"
    }

    async fn resolve(&self, scheme: &SecurityScheme) -> Result<Secret, ResolutionError> {
        let mut attempt = 1;
        loop {
            match self.store.get(&scheme.name).await {
                Ok(Some(secret)) => return Ok(secret),
                Ok(None) => return Err(ResolutionError::NotFound(scheme.name.clone())),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        scheme = %scheme.name,
                        attempt,
                        error = %e,
                        "Transient secret store failure, retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
