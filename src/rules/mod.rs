//! Rules: configured request predicates that gate scopes.
//!
//! # Data Flow
//! ```text
//! Registry::instantiate("path", {"path": "/api"}) → Arc<dyn Matcher>
//!     → RuleInstance (id, name, config, metadata)
//!     → scope rule set (AND) → scope gate
//! ```
//!
//! # Design Decisions
//! - Built-in rules reuse the routing matchers rather than re-implementing
//!   host, path, method and header checks
//! - A rule is immutable once built; changing it means remove + attach

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Method, Request};
use serde_json::Value;
use uuid::Uuid;

use crate::error::BoxError;
use crate::registry::{str_field, FactoryInfo, Param, Registry};
use crate::routing::{HeaderMatcher, HostMatcher, Matcher, MethodMatcher, PathPrefixMatcher};

/// A configured rule bound to a scope.
#[derive(Debug)]
pub struct RuleInstance {
    id: String,
    name: String,
    description: String,
    config: Value,
    metadata: Value,
    matcher: Arc<dyn Matcher>,
}

impl RuleInstance {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        config: Value,
        metadata: Value,
        matcher: Arc<dyn Matcher>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            config,
            metadata,
            matcher,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Factory name the rule was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }
}

impl Matcher for RuleInstance {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }
}

fn required_str<'a>(config: &'a Value, name: &str) -> Result<&'a str, BoxError> {
    match str_field(config, name)? {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(format!("'{name}' must be a non-empty string").into()),
    }
}

fn path_rule(config: &Value) -> Result<Arc<dyn Matcher>, BoxError> {
    let prefix = required_str(config, "path")?;
    if !prefix.starts_with('/') {
        return Err(format!("path prefix '{prefix}' must start with '/'").into());
    }
    Ok(Arc::new(PathPrefixMatcher::new(prefix)))
}

fn vhost_rule(config: &Value) -> Result<Arc<dyn Matcher>, BoxError> {
    Ok(Arc::new(HostMatcher::new(required_str(config, "host")?)))
}

fn method_rule(config: &Value) -> Result<Arc<dyn Matcher>, BoxError> {
    let list = config
        .get("methods")
        .and_then(Value::as_array)
        .ok_or("'methods' must be an array of strings")?;
    if list.is_empty() {
        return Err("'methods' must not be empty".into());
    }

    let methods = list
        .iter()
        .map(|m| {
            let raw = m.as_str().ok_or("'methods' must be an array of strings")?;
            Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
                .map_err(|_| BoxError::from(format!("invalid method '{raw}'")))
        })
        .collect::<Result<Vec<_>, BoxError>>()?;
    Ok(Arc::new(MethodMatcher::new(methods)))
}

fn header_rule(config: &Value) -> Result<Arc<dyn Matcher>, BoxError> {
    let raw = required_str(config, "name")?;
    let name = HeaderName::from_bytes(raw.as_bytes())
        .map_err(|e| format!("invalid header name '{raw}': {e}"))?;
    let matcher = match str_field(config, "value")? {
        None => HeaderMatcher::present(name),
        Some(value) => HeaderMatcher::equals(
            name,
            HeaderValue::from_str(value).map_err(|e| format!("invalid header value: {e}"))?,
        ),
    };
    Ok(Arc::new(matcher))
}

/// Register the built-in rule factories.
pub fn register_builtin(registry: &Registry<Arc<dyn Matcher>>) {
    registry.register(
        FactoryInfo::new("path", "Matches requests whose path starts with a prefix").param(
            Param::required("path", "string", "Path prefix", "/api"),
        ),
        path_rule,
    );
    registry.register(
        FactoryInfo::new("vhost", "Matches the Host header, case-insensitively, port ignored")
            .param(Param::required("host", "string", "Virtual host name", "example.com")),
        vhost_rule,
    );
    registry.register(
        FactoryInfo::new("method", "Matches any of a set of HTTP methods").param(Param::required(
            "methods",
            "array",
            "Accepted methods",
            r#"["GET", "HEAD"]"#,
        )),
        method_rule,
    );
    registry.register(
        FactoryInfo::new("header", "Matches a header's presence or exact value")
            .param(Param::required("name", "string", "Header name", "x-tenant"))
            .param(Param::optional(
                "value",
                "string",
                "Required value; presence only when omitted",
                "blue",
            )),
        header_rule,
    );
}
