//! Security and operation types extracted from an OpenAPI document

use super::SpecError;
use http::Method;
use serde_json::{Map, Value};
use std::fmt;

/// HTTP methods an OpenAPI path item may declare, in document order of preference
pub const OPERATION_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Where an API key is carried on the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

impl ApiKeyLocation {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "header" => Some(Self::Header),
            "query" => Some(Self::Query),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }
}

impl fmt::Display for ApiKeyLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "header"),
            Self::Query => write!(f, "query"),
            Self::Cookie => write!(f, "cookie"),
        }
    }
}

/// HTTP authentication scheme named by an `http` security scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuthScheme {
    Bearer,
    Basic,
    /// Any other IANA-registered scheme (e.g. "Digest"), kept verbatim
    Other(String),
}

impl HttpAuthScheme {
    fn parse(value: &str) -> Self {
        // Scheme names are case-insensitive (RFC 7235)
        match value.to_ascii_lowercase().as_str() {
            "bearer" => Self::Bearer,
            "basic" => Self::Basic,
            _ => Self::Other(value.to_string()),
        }
    }
}

impl fmt::Display for HttpAuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer => write!(f, "Bearer"),
            Self::Basic => write!(f, "Basic"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

/// The mechanism a security scheme uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemeKind {
    /// `type: apiKey`
    ApiKey {
        location: ApiKeyLocation,
        /// Header, query parameter or cookie name
        param_name: String,
    },
    /// `type: http`
    Http { scheme: HttpAuthScheme },
    /// `type: oauth2`
    OAuth2,
    /// `type: openIdConnect`
    OpenIdConnect,
    /// A declared type this crate cannot apply (e.g. `mutualTLS`)
    Unsupported(String),
}

/// A named authentication mechanism declared under `components.securitySchemes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityScheme {
    /// Scheme name, unique within the document
    pub name: String,
    /// How the credential is carried
    pub kind: SchemeKind,
    /// Free-form description from the document
    pub description: Option<String>,
}

impl SecurityScheme {
    /// Parse a single scheme object
    pub(crate) fn from_value(name: &str, value: &Value) -> Result<Self, SpecError> {
        let obj = value.as_object().ok_or_else(|| {
            SpecError::Malformed(format!("security scheme '{}' is not an object", name))
        })?;

        let scheme_type = str_field(obj, "type").ok_or_else(|| {
            SpecError::Malformed(format!("security scheme '{}' has no type", name))
        })?;

        let kind = match scheme_type {
            "apiKey" => {
                let param_name = str_field(obj, "name")
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        SpecError::Malformed(format!(
                            "apiKey scheme '{}' is missing 'name'",
                            name
                        ))
                    })?;
                let location = str_field(obj, "in")
                    .and_then(ApiKeyLocation::parse)
                    .ok_or_else(|| {
                        SpecError::Malformed(format!(
                            "apiKey scheme '{}' must declare 'in' as header, query or cookie",
                            name
                        ))
                    })?;
                SchemeKind::ApiKey {
                    location,
                    param_name: param_name.to_string(),
                }
            }
            "http" => {
                let scheme = str_field(obj, "scheme").ok_or_else(|| {
                    SpecError::Malformed(format!("http scheme '{}' is missing 'scheme'", name))
                })?;
                SchemeKind::Http {
                    scheme: HttpAuthScheme::parse(scheme),
                }
            }
            "oauth2" => SchemeKind::OAuth2,
            "openIdConnect" => SchemeKind::OpenIdConnect,
            other => SchemeKind::Unsupported(other.to_string()),
        };

        Ok(Self {
            name: name.to_string(),
            kind,
            description: str_field(obj, "description").map(str::to_string),
        })
    }

    /// Human-readable summary used in prompts and listings
    pub fn describe(&self) -> String {
        match &self.kind {
            SchemeKind::ApiKey {
                location,
                param_name,
            } => format!("API key for {}: '{}'", location, param_name),
            SchemeKind::Http { scheme } => format!("HTTP {} auth", scheme),
            SchemeKind::OAuth2 => "OAuth2 access token".to_string(),
            SchemeKind::OpenIdConnect => "OpenID Connect token".to_string(),
            SchemeKind::Unsupported(t) => format!("unsupported scheme type '{}'", t),
        }
    }
}

/// A set of scheme names that must all be satisfied together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityRequirement {
    schemes: Vec<String>,
}

impl SecurityRequirement {
    /// Build a requirement from scheme names
    pub fn new<I, S>(schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schemes: schemes.into_iter().map(Into::into).collect(),
        }
    }

    /// Scheme names in declaration order
    pub fn schemes(&self) -> &[String] {
        &self.schemes
    }

    /// An empty requirement object (`{}`) means anonymous access
    pub fn is_anonymous(&self) -> bool {
        self.schemes.is_empty()
    }

    fn from_value(value: &Value) -> Result<Self, SpecError> {
        let obj = value.as_object().ok_or_else(|| {
            SpecError::Malformed("security requirement is not an object".to_string())
        })?;
        Ok(Self::new(obj.keys().cloned()))
    }

    /// Parse a `security` array
    pub(crate) fn parse_list(value: &Value) -> Result<Vec<Self>, SpecError> {
        value
            .as_array()
            .ok_or_else(|| SpecError::Malformed("'security' must be an array".to_string()))?
            .iter()
            .map(Self::from_value)
            .collect()
    }
}

impl fmt::Display for SecurityRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schemes.is_empty() {
            write!(f, "{{}}")
        } else {
            write!(f, "{{{}}}", self.schemes.join(" + "))
        }
    }
}

/// A single method on a path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Path template as declared, e.g. `/users/{id}`
    pub path_template: String,
    /// HTTP method
    pub method: Method,
    /// `operationId`, if declared
    pub operation_id: Option<String>,
    /// Operation-level requirements; `None` falls back to global security
    pub requirements: Option<Vec<SecurityRequirement>>,
}

/// All operations declared on one path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathItem {
    /// Path template as declared
    pub template: String,
    /// Operations in declaration order
    pub operations: Vec<Operation>,
}

impl PathItem {
    pub(crate) fn from_value(template: &str, value: &Value) -> Result<Self, SpecError> {
        let obj = value.as_object().ok_or_else(|| {
            SpecError::Malformed(format!("path item '{}' is not an object", template))
        })?;

        let mut operations = Vec::new();
        for (key, op) in obj {
            // Non-method keys (parameters, summary, servers, $ref) are ignored
            if !OPERATION_METHODS.contains(&key.as_str()) {
                continue;
            }

            let method = Method::from_bytes(key.to_ascii_uppercase().as_bytes())
                .map_err(|e| SpecError::Malformed(format!("invalid method '{}': {}", key, e)))?;

            let requirements = match op.get("security") {
                Some(security) => Some(SecurityRequirement::parse_list(security)?),
                None => None,
            };

            operations.push(Operation {
                path_template: template.to_string(),
                method,
                operation_id: op
                    .get("operationId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                requirements,
            });
        }

        Ok(Self {
            template: template.to_string(),
            operations,
        })
    }

    /// Look up the operation for a method
    pub fn operation(&self, method: &Method) -> Option<&Operation> {
        self.operations.iter().find(|op| op.method == *method)
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_api_key_scheme() {
        let scheme = SecurityScheme::from_value(
            "apiKeyScheme",
            &json!({"type": "apiKey", "in": "header", "name": "X-Key"}),
        )
        .unwrap();

        assert_eq!(
            scheme.kind,
            SchemeKind::ApiKey {
                location: ApiKeyLocation::Header,
                param_name: "X-Key".to_string(),
            }
        );
        assert_eq!(scheme.describe(), "API key for header: 'X-Key'");
    }

    #[test]
    fn test_parse_http_scheme_case_insensitive() {
        let scheme =
            SecurityScheme::from_value("b", &json!({"type": "http", "scheme": "Bearer"})).unwrap();
        assert_eq!(
            scheme.kind,
            SchemeKind::Http {
                scheme: HttpAuthScheme::Bearer
            }
        );
    }

    #[test]
    fn test_api_key_without_name_is_malformed() {
        let result = SecurityScheme::from_value("k", &json!({"type": "apiKey", "in": "header"}));
        assert!(matches!(result, Err(SpecError::Malformed(_))));
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let scheme = SecurityScheme::from_value("m", &json!({"type": "mutualTLS"})).unwrap();
        assert_eq!(scheme.kind, SchemeKind::Unsupported("mutualTLS".to_string()));
    }

    #[test]
    fn test_requirement_list_keeps_order() {
        let list =
            SecurityRequirement::parse_list(&json!([{"b": [], "a": []}, {}])).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].schemes(), &["b".to_string(), "a".to_string()]);
        assert!(list[1].is_anonymous());
    }

    #[test]
    fn test_path_item_ignores_non_method_keys() {
        let item = PathItem::from_value(
            "/users/{id}",
            &json!({
                "parameters": [],
                "get": {"operationId": "getUser", "security": []},
                "delete": {}
            }),
        )
        .unwrap();

        assert_eq!(item.operations.len(), 2);
        let get = item.operation(&Method::GET).unwrap();
        assert_eq!(get.operation_id.as_deref(), Some("getUser"));
        assert_eq!(get.requirements, Some(vec![]));
        assert_eq!(item.operation(&Method::DELETE).unwrap().requirements, None);
        assert!(item.operation(&Method::POST).is_none());
    }
}
