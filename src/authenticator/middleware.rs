//! reqwest middleware hook that authenticates requests before they are sent

use super::{OutgoingRequest, RequestAuthenticator};
use async_trait::async_trait;
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use std::sync::Arc;

/// Runs a [`RequestAuthenticator`] on every request of a `ClientWithMiddleware`
#[derive(Clone)]
pub struct AuthMiddleware {
    authenticator: Arc<RequestAuthenticator>,
}

impl AuthMiddleware {
    /// Wrap an authenticator
    pub fn new(authenticator: Arc<RequestAuthenticator>) -> Self {
        Self { authenticator }
    }
}

impl OutgoingRequest {
    /// Copy the parts of a reqwest request the authenticator works on
    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method().clone(),
            path: request.url().path().to_string(),
            query: request
                .url()
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            headers: request.headers().clone(),
        }
    }

    /// Write headers and query back onto the reqwest request
    pub fn write_to(self, request: &mut Request) {
        let original: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        // Leave the query string byte-for-byte alone unless it changed
        if original != self.query {
            let url = request.url_mut();
            if self.query.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut().clear().extend_pairs(&self.query);
            }
        }

        *request.headers_mut() = self.headers;
    }
}

#[async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let mut outgoing = OutgoingRequest::from_request(&req);
        self.authenticator.apply(&mut outgoing).await;
        outgoing.write_to(&mut req);
        next.run(req, extensions).await
    }
}
