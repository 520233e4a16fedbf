//! Per-request credential injection
//!
//! The [`RequestAuthenticator`] is run on every outgoing request: it drops
//! any caller-supplied `Authorization` header, works out which security
//! requirements the OpenAPI document declares for the request, fetches the matching
//! credentials and writes them onto the request. It never fails a request;
//! anything it cannot apply is logged and left off, and the downstream API's
//! own 401/403 is the signal.

mod middleware;

pub use middleware::AuthMiddleware;

use crate::credentials::CredentialStore;
use crate::router::{PathMatcher, RequirementMode, SecurityResolver};
use crate::spec::{
    ApiKeyLocation, HttpAuthScheme, SchemeKind, SecurityRequirement, SecurityScheme, SpecIndex,
};
use crate::Secret;
use base64::{engine::general_purpose::STANDARD, Engine};
use http::header::{AUTHORIZATION, COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors writing a credential onto a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectionError {
    #[error("invalid header name '{0}'")]
    InvalidHeaderName(String),

    #[error("credential is not a valid header value")]
    InvalidHeaderValue,

    #[error("scheme type '{0}' cannot be applied")]
    Unsupported(String),
}

/// The mutable envelope of a request about to be sent
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    /// Absolute request path, e.g. `/v1/users/42`
    pub path: String,
    /// Decoded query parameters in order
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl OutgoingRequest {
    /// Create a request with no query and no headers
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Add a header, ignoring names or values that are not valid HTTP
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Add a query parameter
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// First value of a header as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Why a scheme was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The requirement names a scheme the document does not declare
    UnknownScheme,
    /// No credential could be obtained
    NoCredential,
    /// The credential could not be written onto the request
    Injection(InjectionError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownScheme => write!(f, "unknown scheme"),
            SkipReason::NoCredential => write!(f, "no credential"),
            SkipReason::Injection(e) => write!(f, "{}", e),
        }
    }
}

/// What the authenticator did to one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthOutcome {
    /// `METHOD /template` of the matched operation
    pub operation: Option<String>,
    /// Whether a caller-supplied `Authorization` header was removed
    pub stripped_authorization: bool,
    /// Schemes applied, in order
    pub applied: Vec<String>,
    /// Schemes left off, with the reason
    pub skipped: Vec<(String, SkipReason)>,
}

/// Applies spec-declared credentials to outgoing requests
pub struct RequestAuthenticator {
    spec: Arc<SpecIndex>,
    matcher: PathMatcher,
    resolver: SecurityResolver,
    credentials: Arc<CredentialStore>,
    mode: RequirementMode,
}

impl RequestAuthenticator {
    /// Create an authenticator; path templates are compiled here, once
    pub fn new(spec: Arc<SpecIndex>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            matcher: PathMatcher::new(spec.clone()),
            resolver: SecurityResolver::new(spec.clone()),
            spec,
            credentials,
            mode: RequirementMode::default(),
        }
    }

    /// Choose how multiple requirement sets are combined
    pub fn with_mode(mut self, mode: RequirementMode) -> Self {
        self.mode = mode;
        self
    }

    /// The requirement mode in effect
    pub fn mode(&self) -> RequirementMode {
        self.mode
    }

    /// The document this authenticator serves
    pub fn spec(&self) -> &Arc<SpecIndex> {
        &self.spec
    }

    /// The credential cache backing this authenticator
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Request path relative to the document's base path
    fn relative_path<'a>(&self, path: &'a str) -> &'a str {
        let base = self.spec.base_path();
        if base.is_empty() {
            return path;
        }
        match path.strip_prefix(base) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        }
    }

    /// Take a request, authenticate it and hand it back
    pub async fn authenticate(&self, mut request: OutgoingRequest) -> OutgoingRequest {
        self.apply(&mut request).await;
        request
    }

    /// Authenticate a request in place
    pub async fn apply(&self, request: &mut OutgoingRequest) -> AuthOutcome {
        let mut outcome = AuthOutcome::default();

        if request.headers.remove(AUTHORIZATION).is_some() {
            debug!("Removed caller-supplied Authorization header");
            outcome.stripped_authorization = true;
        }

        let path = self.relative_path(&request.path).to_string();
        let operation = self.matcher.match_operation(&request.method, &path);
        outcome.operation = operation.map(|op| format!("{} {}", op.method, op.path_template));

        let requirements = self.resolver.resolve(operation);
        if requirements.is_empty() {
            debug!(method = %request.method, path = %path, "No security required");
            return outcome;
        }

        match self.mode {
            RequirementMode::ApplyAll => {
                for requirement in requirements {
                    for name in requirement.schemes() {
                        self.apply_scheme(name, request, &mut outcome).await;
                    }
                }
            }
            RequirementMode::FirstSatisfiable => {
                self.apply_first_satisfiable(requirements, request, &mut outcome)
                    .await;
            }
        }

        debug!(
            method = %request.method,
            path = %path,
            applied = ?outcome.applied,
            headers = ?request.headers.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            "Authenticated outgoing request"
        );

        outcome
    }

    /// Fetch and inject one scheme, recording the result
    async fn apply_scheme(
        &self,
        name: &str,
        request: &mut OutgoingRequest,
        outcome: &mut AuthOutcome,
    ) {
        let Some(scheme) = self.spec.scheme(name) else {
            debug!(scheme = %name, "Requirement names an undeclared scheme, skipping");
            outcome
                .skipped
                .push((name.to_string(), SkipReason::UnknownScheme));
            return;
        };

        if let SchemeKind::Unsupported(kind) = &scheme.kind {
            warn!(scheme = %name, kind = %kind, "Scheme type cannot be applied, skipping");
            outcome.skipped.push((
                name.to_string(),
                SkipReason::Injection(InjectionError::Unsupported(kind.clone())),
            ));
            return;
        }

        let Some(secret) = self.credentials.get(name).await else {
            warn!(scheme = %name, "No credential available for scheme, skipping");
            outcome
                .skipped
                .push((name.to_string(), SkipReason::NoCredential));
            return;
        };

        self.inject_recorded(scheme, &secret, request, outcome);
    }

    fn inject_recorded(
        &self,
        scheme: &SecurityScheme,
        secret: &Secret,
        request: &mut OutgoingRequest,
        outcome: &mut AuthOutcome,
    ) {
        match inject(scheme, secret, request) {
            Ok(()) => outcome.applied.push(scheme.name.clone()),
            Err(e) => {
                warn!(scheme = %scheme.name, error = %e, "Could not apply credential");
                outcome
                    .skipped
                    .push((scheme.name.clone(), SkipReason::Injection(e)));
            }
        }
    }

    /// Apply only the first requirement set whose schemes all resolve.
    /// With none satisfiable, fall back to best effort on the first set.
    async fn apply_first_satisfiable(
        &self,
        requirements: &[SecurityRequirement],
        request: &mut OutgoingRequest,
        outcome: &mut AuthOutcome,
    ) {
        for requirement in requirements {
            if requirement.is_anonymous() {
                debug!("Anonymous alternative satisfies the request");
                return;
            }

            let mut resolved = Vec::with_capacity(requirement.schemes().len());
            for name in requirement.schemes() {
                let Some(scheme) = self.spec.scheme(name) else {
                    break;
                };
                if matches!(scheme.kind, SchemeKind::Unsupported(_)) {
                    break;
                }
                let Some(secret) = self.credentials.get(name).await else {
                    break;
                };
                resolved.push((scheme, secret));
            }

            if resolved.len() == requirement.schemes().len() {
                debug!(requirement = %requirement, "Selected satisfiable requirement set");
                for (scheme, secret) in &resolved {
                    self.inject_recorded(scheme, secret, request, outcome);
                }
                return;
            }
        }

        if let Some(first) = requirements.first() {
            warn!(
                requirement = %first,
                "No requirement set is fully satisfiable, applying the first one partially"
            );
            for name in first.schemes() {
                self.apply_scheme(name, request, outcome).await;
            }
        }
    }
}

/// Write a credential onto a request according to its scheme
pub fn inject(
    scheme: &SecurityScheme,
    secret: &Secret,
    request: &mut OutgoingRequest,
) -> Result<(), InjectionError> {
    match &scheme.kind {
        SchemeKind::ApiKey {
            location: ApiKeyLocation::Header,
            param_name,
        } => {
            let name = HeaderName::from_bytes(param_name.as_bytes())
                .map_err(|_| InjectionError::InvalidHeaderName(param_name.clone()))?;
            request.headers.insert(name, sensitive_value(secret.expose())?);
        }

        SchemeKind::ApiKey {
            location: ApiKeyLocation::Query,
            param_name,
        } => {
            request.query.retain(|(k, _)| k != param_name);
            request
                .query
                .push((param_name.clone(), secret.expose().to_string()));
        }

        SchemeKind::ApiKey {
            location: ApiKeyLocation::Cookie,
            param_name,
        } => {
            // Same-name cookies from the caller are dropped, others kept in order
            let mut pairs: Vec<String> = request
                .headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(';'))
                .map(str::trim)
                .filter(|pair| !pair.is_empty())
                .filter(|pair| pair.split('=').next().map(str::trim) != Some(param_name.as_str()))
                .map(str::to_string)
                .collect();
            pairs.push(format!("{}={}", param_name, secret.expose()));
            request
                .headers
                .insert(COOKIE, sensitive_value(&pairs.join("; "))?);
        }

        SchemeKind::Http {
            scheme: HttpAuthScheme::Basic,
        } => {
            let encoded = basic_credential(secret.expose());
            request
                .headers
                .insert(AUTHORIZATION, sensitive_value(&format!("Basic {}", encoded))?);
        }

        SchemeKind::Http {
            scheme: HttpAuthScheme::Bearer,
        }
        | SchemeKind::OAuth2
        | SchemeKind::OpenIdConnect => {
            request.headers.insert(
                AUTHORIZATION,
                sensitive_value(&format!("Bearer {}", secret.expose()))?,
            );
        }

        SchemeKind::Http {
            scheme: HttpAuthScheme::Other(name),
        } => {
            request.headers.insert(
                AUTHORIZATION,
                sensitive_value(&format!("{} {}", name, secret.expose()))?,
            );
        }

        SchemeKind::Unsupported(kind) => return Err(InjectionError::Unsupported(kind.clone())),
    }

    Ok(())
}

/// Basic credentials are sent as-is unless given raw as `user:password`
fn basic_credential(credential: &str) -> String {
    if credential.contains(':') {
        STANDARD.encode(credential.as_bytes())
    } else {
        credential.to_string()
    }
}

fn sensitive_value(value: &str) -> Result<HeaderValue, InjectionError> {
    let mut value = HeaderValue::from_str(value).map_err(|_| InjectionError::InvalidHeaderValue)?;
    value.set_sensitive(true);
    Ok(value)
}
