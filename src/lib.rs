//! specauth - Dynamic outbound authentication for OpenAPI-described APIs
//!
//! specauth reads the security declarations of an arbitrary OpenAPI document
//! and, for every outgoing request, works out which schemes apply, resolves
//! the matching credentials once per session, and injects them into the
//! request before it leaves the process.

pub mod authenticator;
pub mod client;
pub mod config;
pub mod credentials;
pub mod router;
pub mod spec;

pub use authenticator::{AuthMiddleware, AuthOutcome, OutgoingRequest, RequestAuthenticator};
pub use client::SpecClient;
pub use credentials::CredentialStore;
pub use router::{PathMatcher, RequirementMode, SecurityResolver};
pub use spec::SpecIndex;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Core error types for specauth
#[derive(Error, Debug)]
pub enum SpecAuthError {
    #[error("Spec error: {0}")]
    Spec(#[from] spec::SpecError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Client error: {0}")]
    Client(#[from] client::ClientError),
}

/// A secret string wrapper that never prints its value
#[derive(Debug, Clone)]
pub struct Secret(SecretString);

impl Secret {
    /// Create a new secret from a string
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Expose the secret value
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Whether the secret is the empty string
    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("hunter2"));
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_module_errors_convert() {
        let err: SpecAuthError = config::ConfigError::Invalid("no spec source".to_string()).into();
        assert!(matches!(err, SpecAuthError::Config(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: no spec source"
        );

        let err: SpecAuthError = spec::SpecError::NoBaseUrl("none".to_string()).into();
        assert!(matches!(err, SpecAuthError::Spec(_)));
    }

    #[test]
    fn test_secret_empty() {
        assert!(Secret::new("").is_empty());
        assert!(!Secret::from("x").is_empty());
    }
}
