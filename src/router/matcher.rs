//! Path template matching against concrete request paths

use crate::spec::{Operation, PathItem, SpecIndex};
use http::Method;
use std::sync::Arc;
use tracing::{debug, trace};

/// One segment of a compiled path template
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Must equal the request segment exactly
    Literal(String),
    /// `{name}`: any single non-empty segment
    Param(String),
}

/// A path template compiled into segment matchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compile a template such as `/users/{id}/posts`
    pub fn parse(template: &str) -> Self {
        let segments = split_path(template)
            .into_iter()
            .map(|seg| {
                match seg
                    .strip_prefix('{')
                    .and_then(|rest| rest.strip_suffix('}'))
                {
                    Some(name) => Segment::Param(name.to_string()),
                    None => Segment::Literal(seg.to_string()),
                }
            })
            .collect();

        Self {
            raw: template.to_string(),
            segments,
        }
    }

    /// The template as declared
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the path parameters, in order
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|seg| match seg {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match already-split request segments
    fn matches_segments(&self, request: &[&str]) -> bool {
        self.segments.len() == request.len()
            && self
                .segments
                .iter()
                .zip(request)
                .all(|(seg, req)| match seg {
                    Segment::Param(_) => !req.is_empty(),
                    Segment::Literal(lit) => lit == req,
                })
    }

    /// Whether a concrete path matches this template
    pub fn matches(&self, path: &str) -> bool {
        self.matches_segments(&split_path(path))
    }
}

/// Split on `/`, discarding empty leading and trailing segments
fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

/// Matches request method + path to the operation declared for it
///
/// Templates are tried in the order the document declares them; the first
/// template that matches decides the result even if it lacks the method.
pub struct PathMatcher {
    spec: Arc<SpecIndex>,
    /// Compiled templates, parallel to `spec.operations_by_path_template()`
    templates: Vec<PathTemplate>,
}

impl PathMatcher {
    /// Compile every path template of the document
    pub fn new(spec: Arc<SpecIndex>) -> Self {
        let templates = spec
            .operations_by_path_template()
            .iter()
            .map(|item| PathTemplate::parse(&item.template))
            .collect();

        Self { spec, templates }
    }

    /// Find the first path item whose template matches `path`
    pub fn match_path(&self, path: &str) -> Option<&PathItem> {
        let request = split_path(path);
        self.templates
            .iter()
            .position(|t| t.matches_segments(&request))
            .map(|idx| &self.spec.operations_by_path_template()[idx])
    }

    /// Find the operation for a request, or `None` to fall back to global security
    pub fn match_operation(&self, method: &Method, path: &str) -> Option<&Operation> {
        let Some(item) = self.match_path(path) else {
            debug!(method = %method, path = %path, "No path template matches request");
            return None;
        };

        trace!(path = %path, template = %item.template, "Matched path template");

        let operation = item.operation(method);
        if operation.is_none() {
            debug!(
                method = %method,
                template = %item.template,
                "Matched template does not declare this method"
            );
        }
        operation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn matcher(paths: serde_json::Value) -> PathMatcher {
        let doc = json!({
            "servers": [{"url": "https://api.example.com"}],
            "paths": paths
        });
        PathMatcher::new(Arc::new(SpecIndex::from_value(&doc).unwrap()))
    }

    #[test]
    fn test_template_parse() {
        let t = PathTemplate::parse("/users/{id}/posts/{postId}");
        assert_eq!(t.as_str(), "/users/{id}/posts/{postId}");
        assert_eq!(t.param_names().collect::<Vec<_>>(), vec!["id", "postId"]);
    }

    #[test]
    fn test_placeholder_matches_single_segment() {
        let t = PathTemplate::parse("/users/{id}");
        assert!(t.matches("/users/42"));
        assert!(t.matches("users/42/"));
        assert!(!t.matches("/users/42/posts"));
        assert!(!t.matches("/users"));
        assert!(!t.matches("/users//"));
    }

    #[test]
    fn test_placeholder_rejects_empty_interior_segment() {
        let t = PathTemplate::parse("/a/{x}/b");
        assert!(t.matches("/a/1/b"));
        assert!(!t.matches("/a//b"));
    }

    #[test]
    fn test_literals_are_case_sensitive() {
        let t = PathTemplate::parse("/Users/{id}");
        assert!(t.matches("/Users/1"));
        assert!(!t.matches("/users/1"));
    }

    #[test]
    fn test_root_template() {
        let t = PathTemplate::parse("/");
        assert!(t.matches("/"));
        assert!(t.matches(""));
        assert!(!t.matches("/x"));
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let m = matcher(json!({
            "/users/{id}": {"get": {"operationId": "byId"}},
            "/users/me": {"get": {"operationId": "me"}}
        }));
        let op = m.match_operation(&Method::GET, "/users/me").unwrap();
        assert_eq!(op.operation_id.as_deref(), Some("byId"));

        let m = matcher(json!({
            "/users/me": {"get": {"operationId": "me"}},
            "/users/{id}": {"get": {"operationId": "byId"}}
        }));
        let op = m.match_operation(&Method::GET, "/users/me").unwrap();
        assert_eq!(op.operation_id.as_deref(), Some("me"));
    }

    #[test]
    fn test_segment_count_mismatch_is_none() {
        let m = matcher(json!({
            "/users": {"get": {}},
            "/users/{id}": {"get": {}}
        }));
        assert!(m.match_operation(&Method::GET, "/users/1/posts/2").is_none());
        assert!(m.match_operation(&Method::GET, "/").is_none());
    }

    #[test]
    fn test_first_matching_template_without_method_is_none() {
        let m = matcher(json!({
            "/items/{id}": {"get": {}},
            "/items/{name}": {"post": {}}
        }));
        assert!(m.match_operation(&Method::GET, "/items/1").is_some());
        assert!(m.match_operation(&Method::POST, "/items/1").is_none());
        assert_eq!(m.match_path("/items/1").unwrap().template, "/items/{id}");
    }
}
