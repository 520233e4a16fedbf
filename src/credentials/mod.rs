//! Credential resolution and the per-session credential cache
//!
//! A [`CredentialStore`] maps security scheme names to secrets. Secrets are
//! resolved through a pluggable [`CredentialSource`] either eagerly (priming,
//! before traffic starts) or lazily on first use, and are then cached for
//! the lifetime of the store. Resolution of any one scheme is single-flight:
//! concurrent first-use callers wait for one resolution, and share its
//! result or its failure, instead of each starting their own.

mod secret_store;
mod sources;

pub use secret_store::{FileSecretStore, SecretStore, SecretStoreError, SecretStoreSource};
pub use sources::{env_var_name, ChainSource, EnvSource, PromptSource, DEFAULT_ENV_PREFIX};

use crate::spec::{SchemeKind, SecurityScheme, SpecIndex};
use crate::Secret;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Default bound on a single non-interactive resolution
pub const DEFAULT_RESOLUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Credential resolution errors
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("No credential available for scheme '{0}'")]
    NotFound(String),

    #[error("Unknown security scheme: {0}")]
    UnknownScheme(String),

    #[error("Credential unavailable: {0}")]
    Unavailable(String),

    #[error("Secret store error: {0}")]
    Store(#[from] SecretStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A strategy for obtaining the secret for a security scheme
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Whether resolution blocks on a human at a terminal
    fn is_interactive(&self) -> bool {
        false
    }

    /// Resolve the secret for a scheme
    async fn resolve(&self, scheme: &SecurityScheme) -> Result<Secret, ResolutionError>;
}

/// Outcome of a priming pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrimeReport {
    /// Schemes resolved during this pass
    pub primed: Vec<String>,
    /// Schemes that were already cached
    pub already_cached: Vec<String>,
    /// Schemes that could not be resolved, with the reason
    pub failed: Vec<(String, String)>,
}

impl PrimeReport {
    /// Whether every requested scheme ended up cached
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Resolution gate for one scheme
#[derive(Default)]
struct Slot {
    /// Number of failed attempts so far
    failures: AtomicU64,
    /// Held for the duration of an attempt; keeps the last failure for waiters
    attempt: AsyncMutex<Option<Arc<ResolutionError>>>,
}

/// Session-scoped cache of resolved credentials
pub struct CredentialStore {
    spec: Arc<SpecIndex>,
    /// Used by `prime`; may be interactive
    priming_source: Arc<dyn CredentialSource>,
    /// Used by `get` on a cache miss; interactive sources are refused here
    on_demand_source: Option<Arc<dyn CredentialSource>>,
    /// Resolved secrets; an entry is never replaced
    secrets: RwLock<HashMap<String, Secret>>,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    resolution_timeout: Option<Duration>,
}

impl CredentialStore {
    /// Create a store that primes and resolves on demand with the same source
    pub fn new(spec: Arc<SpecIndex>, source: Arc<dyn CredentialSource>) -> Self {
        Self {
            spec,
            on_demand_source: Some(source.clone()),
            priming_source: source,
            secrets: RwLock::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
            resolution_timeout: Some(DEFAULT_RESOLUTION_TIMEOUT),
        }
    }

    /// Replace (or remove, with `None`) the source used for cache misses at request time
    pub fn with_on_demand_source(mut self, source: Option<Arc<dyn CredentialSource>>) -> Self {
        self.on_demand_source = source;
        self
    }

    /// Bound non-interactive resolutions; `None` disables the bound
    pub fn with_resolution_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.resolution_timeout = timeout;
        self
    }

    fn slot(&self, scheme_name: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock();
        slots.entry(scheme_name.to_string()).or_default().clone()
    }

    fn cached(&self, scheme_name: &str) -> Option<Secret> {
        self.secrets.read().get(scheme_name).cloned()
    }

    /// Whether a credential is cached for a scheme
    pub fn is_cached(&self, scheme_name: &str) -> bool {
        self.secrets.read().contains_key(scheme_name)
    }

    /// Names of all cached schemes, sorted
    pub fn cached_schemes(&self) -> Vec<String> {
        let mut names: Vec<_> = self.secrets.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Seed a credential directly; returns `false` if one was already cached
    pub fn insert(&self, scheme_name: &str, secret: Secret) -> bool {
        let mut secrets = self.secrets.write();
        if secrets.contains_key(scheme_name) {
            return false;
        }
        secrets.insert(scheme_name.to_string(), secret);
        true
    }

    async fn resolve_with(
        &self,
        source: &dyn CredentialSource,
        scheme: &SecurityScheme,
    ) -> Result<Secret, ResolutionError> {
        let secret = match self.resolution_timeout {
            Some(limit) if !source.is_interactive() => {
                tokio::time::timeout(limit, source.resolve(scheme))
                    .await
                    .map_err(|_| {
                        ResolutionError::Unavailable(format!(
                            "resolution of '{}' via {} timed out after {:?}",
                            scheme.name,
                            source.name(),
                            limit
                        ))
                    })??
            }
            _ => source.resolve(scheme).await?,
        };

        if secret.is_empty() {
            return Err(ResolutionError::NotFound(scheme.name.clone()));
        }
        Ok(secret)
    }

    /// Resolve a scheme into the cache
    ///
    /// Concurrent callers share one attempt and its outcome, failure
    /// included. A caller arriving after a failed attempt has finished
    /// starts a fresh one.
    async fn fill(
        &self,
        source: &dyn CredentialSource,
        scheme: &SecurityScheme,
    ) -> Result<Secret, Arc<ResolutionError>> {
        let slot = self.slot(&scheme.name);
        let failures_seen = slot.failures.load(Ordering::SeqCst);
        let mut last_failure = slot.attempt.lock().await;

        if let Some(secret) = self.cached(&scheme.name) {
            return Ok(secret);
        }
        if slot.failures.load(Ordering::SeqCst) != failures_seen {
            if let Some(err) = last_failure.as_ref() {
                debug!(scheme = %scheme.name, "Sharing outcome of concurrent failed resolution");
                return Err(err.clone());
            }
        }

        match self.resolve_with(source, scheme).await {
            Ok(secret) => {
                let secret = self
                    .secrets
                    .write()
                    .entry(scheme.name.clone())
                    .or_insert(secret)
                    .clone();
                *last_failure = None;
                info!(
                    scheme = %scheme.name,
                    source = %source.name(),
                    "Credential cached for this session"
                );
                Ok(secret)
            }
            Err(e) => {
                let e = Arc::new(e);
                *last_failure = Some(e.clone());
                slot.failures.fetch_add(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Eagerly resolve credentials for the given schemes
    ///
    /// Failures are logged and reported, never returned: requests that need
    /// an unresolved scheme get another chance at request time.
    pub async fn prime<I, S>(&self, scheme_names: I) -> PrimeReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = PrimeReport::default();

        for name in scheme_names {
            let name = name.as_ref();

            if self.is_cached(name) {
                report.already_cached.push(name.to_string());
                continue;
            }

            let Some(scheme) = self.spec.scheme(name) else {
                warn!(scheme = %name, "Cannot prime undeclared security scheme");
                report
                    .failed
                    .push((name.to_string(), ResolutionError::UnknownScheme(name.to_string()).to_string()));
                continue;
            };

            if let SchemeKind::Unsupported(kind) = &scheme.kind {
                debug!(scheme = %name, kind = %kind, "Not priming unsupported scheme type");
                report
                    .failed
                    .push((name.to_string(), format!("scheme type '{}' cannot be applied", kind)));
                continue;
            }

            match self.fill(self.priming_source.as_ref(), scheme).await {
                Ok(_) => report.primed.push(name.to_string()),
                Err(e) => {
                    warn!(scheme = %name, error = %e, "Failed to prime credential, skipping");
                    report.failed.push((name.to_string(), e.to_string()));
                }
            }
        }

        report
    }

    /// Prime every scheme the document declares that can be applied
    pub async fn prime_all(&self) -> PrimeReport {
        let names: Vec<String> = self
            .spec
            .scheme_names()
            .iter()
            .filter(|name| {
                self.spec
                    .scheme(name)
                    .is_some_and(|s| !matches!(s.kind, SchemeKind::Unsupported(_)))
            })
            .cloned()
            .collect();
        if names.is_empty() {
            info!("No security schemes declared, nothing to prime");
        }
        self.prime(names).await
    }

    /// Get the credential for a scheme, resolving it once on a cache miss
    pub async fn get(&self, scheme_name: &str) -> Option<Secret> {
        if let Some(secret) = self.cached(scheme_name) {
            return Some(secret);
        }

        let Some(scheme) = self.spec.scheme(scheme_name) else {
            debug!(scheme = %scheme_name, "No credential for undeclared scheme");
            return None;
        };

        let Some(source) = self.on_demand_source.as_ref() else {
            debug!(scheme = %scheme_name, "No on-demand credential source configured");
            return None;
        };

        if source.is_interactive() {
            warn!(
                scheme = %scheme_name,
                source = %source.name(),
                "Refusing interactive credential resolution outside priming"
            );
            return None;
        }

        match self.fill(source.as_ref(), scheme).await {
            Ok(secret) => Some(secret),
            Err(e) => {
                warn!(scheme = %scheme_name, error = %e, "Credential unavailable");
                None
            }
        }
    }
}
