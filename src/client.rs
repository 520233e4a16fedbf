//! HTTP client bound to a spec's base URL with authentication installed

use crate::authenticator::{AuthMiddleware, RequestAuthenticator};
use reqwest::Method;
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Client construction and request errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest_middleware::Error),
}

/// Options for the underlying reqwest client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Whole-request timeout
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            user_agent: concat!("specauth/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// A reqwest client whose every request passes through the authenticator
pub struct SpecClient {
    base_url: Url,
    client: ClientWithMiddleware,
    authenticator: Arc<RequestAuthenticator>,
}

impl SpecClient {
    /// Build a client for the authenticator's spec
    pub fn new(
        authenticator: Arc<RequestAuthenticator>,
        options: &ClientOptions,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().user_agent(options.user_agent.clone());
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        let client = reqwest_middleware::ClientBuilder::new(builder.build()?)
            .with(AuthMiddleware::new(authenticator.clone()))
            .build();

        Ok(Self {
            base_url: authenticator.spec().base_url().clone(),
            client,
            authenticator,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The authenticator installed on this client
    pub fn authenticator(&self) -> &Arc<RequestAuthenticator> {
        &self.authenticator
    }

    /// The underlying middleware client
    pub fn inner(&self) -> &ClientWithMiddleware {
        &self.client
    }

    /// Absolute URL for a path relative to the base URL (may carry a `?query`)
    pub fn url(&self, path: &str) -> Url {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };

        let base_path = self.base_url.path().trim_end_matches('/');
        let mut url = self.base_url.clone();
        url.set_path(&format!("{}/{}", base_path, path.trim_start_matches('/')));
        url.set_query(query);
        url
    }

    /// Start a request to a path relative to the base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Start a GET request
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    /// Start a POST request
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }
}
