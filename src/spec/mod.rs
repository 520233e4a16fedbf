//! OpenAPI document loading and indexing
//!
//! Extracts only what outbound authentication needs: the base URL, the
//! declared security schemes, global security and the per-operation
//! security of every path template, in declaration order.

mod types;

pub use types::*;

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};
use url::Url;

/// Spec loading errors
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Malformed spec: {0}")]
    Malformed(String),

    #[error("No usable base URL: {0}")]
    NoBaseUrl(String),

    #[error("Failed to parse spec: {0}")]
    Parse(String),

    #[error("Failed to read spec: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to fetch spec: {0}")]
    Fetch(#[from] reqwest::Error),
}

/// Options that influence how a document is turned into a [`SpecIndex`]
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Where the document came from; relative server URLs resolve against it
    pub origin: Option<Url>,
    /// Use this base URL instead of `servers[0].url`
    pub base_url_override: Option<Url>,
}

/// Read-only index over an OpenAPI document
#[derive(Debug, Clone)]
pub struct SpecIndex {
    title: Option<String>,
    base_url: Url,
    schemes: HashMap<String, SecurityScheme>,
    /// Scheme names in declaration order
    scheme_order: Vec<String>,
    global_security: Vec<SecurityRequirement>,
    paths: Vec<PathItem>,
}

impl SpecIndex {
    /// Build an index from a parsed document
    pub fn from_value(document: &Value) -> Result<Self, SpecError> {
        Self::from_value_with(document, &LoadOptions::default())
    }

    /// Build an index from a parsed document with explicit load options
    pub fn from_value_with(document: &Value, options: &LoadOptions) -> Result<Self, SpecError> {
        let root = document
            .as_object()
            .ok_or_else(|| SpecError::Malformed("document is not a mapping".to_string()))?;

        let base_url = match &options.base_url_override {
            Some(url) => url.clone(),
            None => resolve_base_url(document, options.origin.as_ref())?,
        };

        let paths_obj = root
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| SpecError::Malformed("document has no 'paths' mapping".to_string()))?;

        let paths = paths_obj
            .iter()
            .map(|(template, item)| PathItem::from_value(template, item))
            .collect::<Result<Vec<_>, _>>()?;

        let mut schemes = HashMap::new();
        let mut scheme_order = Vec::new();
        if let Some(declared) = document
            .pointer("/components/securitySchemes")
            .and_then(Value::as_object)
        {
            for (name, value) in declared {
                if value.get("$ref").is_some() {
                    warn!(scheme = %name, "Skipping security scheme declared by $ref");
                    continue;
                }
                let scheme = SecurityScheme::from_value(name, value)?;
                scheme_order.push(name.clone());
                schemes.insert(name.clone(), scheme);
            }
        }

        let global_security = match root.get("security") {
            Some(value) => SecurityRequirement::parse_list(value)?,
            None => Vec::new(),
        };

        let title = document
            .pointer("/info/title")
            .and_then(Value::as_str)
            .map(str::to_string);

        debug!(
            base_url = %base_url,
            paths = paths.len(),
            schemes = schemes.len(),
            "Indexed spec"
        );

        Ok(Self {
            title,
            base_url,
            schemes,
            scheme_order,
            global_security,
            paths,
        })
    }

    /// Parse a JSON or YAML document
    pub fn from_str_with(content: &str, options: &LoadOptions) -> Result<Self, SpecError> {
        let document = parse_document(content)?;
        Self::from_value_with(&document, options)
    }

    /// Load a spec from a file on disk
    pub async fn from_file(
        path: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> Result<Self, SpecError> {
        let content = fs::read_to_string(path.as_ref()).await?;
        Self::from_str_with(&content, options)
    }

    /// Fetch a spec over HTTP(S)
    pub async fn fetch(url: &Url, options: &LoadOptions) -> Result<Self, SpecError> {
        let content = reqwest::get(url.clone())
            .await?
            .error_for_status()?
            .text()
            .await?;

        let mut options = options.clone();
        options.origin.get_or_insert_with(|| url.clone());
        Self::from_str_with(&content, &options)
    }

    /// Load from a source string that is either an `http(s)` URL or a file path
    pub async fn load(source: &str, options: &LoadOptions) -> Result<Self, SpecError> {
        match Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::fetch(&url, options).await,
            _ => Self::from_file(source, options).await,
        }
    }

    /// Document title from `info.title`
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Base URL of the downstream API
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Path prefix of the base URL without a trailing slash (`""` for the root)
    pub fn base_path(&self) -> &str {
        self.base_url.path().trim_end_matches('/')
    }

    /// Declared security schemes by name
    pub fn security_schemes(&self) -> &HashMap<String, SecurityScheme> {
        &self.schemes
    }

    /// Look up a single scheme
    pub fn scheme(&self, name: &str) -> Option<&SecurityScheme> {
        self.schemes.get(name)
    }

    /// Scheme names in declaration order
    pub fn scheme_names(&self) -> &[String] {
        &self.scheme_order
    }

    /// Document-level security requirements
    pub fn global_security(&self) -> &[SecurityRequirement] {
        &self.global_security
    }

    /// Path items in declaration order
    pub fn operations_by_path_template(&self) -> &[PathItem] {
        &self.paths
    }

    /// Iterate over every operation
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.paths.iter().flat_map(|p| p.operations.iter())
    }
}

/// Parse JSON, falling back to YAML
fn parse_document(content: &str) -> Result<Value, SpecError> {
    match serde_json::from_str(content) {
        Ok(value) => Ok(value),
        Err(json_err) => serde_yaml::from_str(content).map_err(|yaml_err| {
            SpecError::Parse(format!(
                "not valid JSON ({}) or YAML ({})",
                json_err, yaml_err
            ))
        }),
    }
}

/// Resolve `servers[0].url`, substituting server variable defaults
fn resolve_base_url(document: &Value, origin: Option<&Url>) -> Result<Url, SpecError> {
    let server = document
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|servers| servers.first())
        .ok_or_else(|| SpecError::NoBaseUrl("document declares no servers".to_string()))?;

    let raw = server
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| SpecError::NoBaseUrl("servers[0].url is missing or empty".to_string()))?;

    let mut expanded = raw.to_string();
    if let Some(vars) = server.get("variables").and_then(Value::as_object) {
        for (name, var) in vars {
            if let Some(default) = var.get("default").and_then(Value::as_str) {
                expanded = expanded.replace(&format!("{{{}}}", name), default);
            }
        }
    }

    match Url::parse(&expanded) {
        Ok(url) if url.has_host() => Ok(url),
        Ok(url) => Err(SpecError::NoBaseUrl(format!("'{}' has no host", url))),
        Err(url::ParseError::RelativeUrlWithoutBase) => match origin {
            Some(origin) => origin
                .join(&expanded)
                .map_err(|e| SpecError::NoBaseUrl(format!("'{}': {}", expanded, e))),
            None => Err(SpecError::NoBaseUrl(format!(
                "'{}' is relative and the document origin is unknown",
                expanded
            ))),
        },
        Err(e) => Err(SpecError::NoBaseUrl(format!("'{}': {}", expanded, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "openapi": "3.0.0",
            "info": {"title": "Users API", "version": "1.0"},
            "servers": [{"url": "https://api.example.com/v1"}],
            "security": [{"bearerScheme": []}],
            "components": {
                "securitySchemes": {
                    "apiKeyScheme": {"type": "apiKey", "in": "header", "name": "X-Key"},
                    "bearerScheme": {"type": "http", "scheme": "bearer"}
                }
            },
            "paths": {
                "/users": {"get": {}},
                "/users/{id}": {"get": {"security": [{"apiKeyScheme": []}]}}
            }
        })
    }

    #[test]
    fn test_load_sample() {
        let index = SpecIndex::from_value(&sample()).unwrap();

        assert_eq!(index.title(), Some("Users API"));
        assert_eq!(index.base_url().as_str(), "https://api.example.com/v1");
        assert_eq!(index.base_path(), "/v1");
        assert_eq!(index.scheme_names(), &["apiKeyScheme", "bearerScheme"]);
        assert_eq!(index.global_security().len(), 1);

        let templates: Vec<_> = index
            .operations_by_path_template()
            .iter()
            .map(|p| p.template.as_str())
            .collect();
        assert_eq!(templates, vec!["/users", "/users/{id}"]);

        let op = index.operations_by_path_template()[1]
            .operation(&Method::GET)
            .unwrap();
        assert_eq!(
            op.requirements,
            Some(vec![SecurityRequirement::new(["apiKeyScheme"])])
        );
    }

    #[test]
    fn test_missing_paths_is_malformed() {
        let doc = json!({"servers": [{"url": "https://api.example.com"}]});
        assert!(matches!(
            SpecIndex::from_value(&doc),
            Err(SpecError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_servers_is_no_base_url() {
        let doc = json!({"paths": {}});
        assert!(matches!(
            SpecIndex::from_value(&doc),
            Err(SpecError::NoBaseUrl(_))
        ));

        let doc = json!({"servers": [{"url": ""}], "paths": {}});
        assert!(matches!(
            SpecIndex::from_value(&doc),
            Err(SpecError::NoBaseUrl(_))
        ));
    }

    #[test]
    fn test_relative_server_url_uses_origin() {
        let doc = json!({"servers": [{"url": "/api"}], "paths": {}});
        assert!(matches!(
            SpecIndex::from_value(&doc),
            Err(SpecError::NoBaseUrl(_))
        ));

        let options = LoadOptions {
            origin: Some(Url::parse("https://example.com/openapi.json").unwrap()),
            base_url_override: None,
        };
        let index = SpecIndex::from_value_with(&doc, &options).unwrap();
        assert_eq!(index.base_url().as_str(), "https://example.com/api");
    }

    #[test]
    fn test_server_variables_are_substituted() {
        let doc = json!({
            "servers": [{
                "url": "https://{region}.example.com",
                "variables": {"region": {"default": "eu"}}
            }],
            "paths": {}
        });
        let index = SpecIndex::from_value(&doc).unwrap();
        assert_eq!(index.base_url().host_str(), Some("eu.example.com"));
    }

    #[test]
    fn test_base_url_override_skips_servers() {
        let doc = json!({"paths": {}});
        let options = LoadOptions {
            origin: None,
            base_url_override: Some(Url::parse("http://localhost:8080").unwrap()),
        };
        let index = SpecIndex::from_value_with(&doc, &options).unwrap();
        assert_eq!(index.base_path(), "");
    }

    #[test]
    fn test_yaml_document() {
        let yaml = r#"
openapi: 3.0.0
servers:
  - url: https://api.example.com
paths:
  /orders:
    get:
      security: []
"#;
        let index = SpecIndex::from_str_with(yaml, &LoadOptions::default()).unwrap();
        let op = index.operations().next().unwrap();
        assert_eq!(op.path_template, "/orders");
        assert_eq!(op.requirements, Some(vec![]));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let result = SpecIndex::from_str_with("{ not: [valid", &LoadOptions::default());
        assert!(matches!(result, Err(SpecError::Parse(_))));
    }

    #[tokio::test]
    async fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openapi.json");
        std::fs::write(&path, sample().to_string()).unwrap();

        let index = SpecIndex::load(path.to_str().unwrap(), &LoadOptions::default())
            .await
            .unwrap();
        assert_eq!(index.security_schemes().len(), 2);
    }
}
