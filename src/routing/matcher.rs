//! Request predicates.
//!
//! # Responsibilities
//! - Match host (case-insensitive, port ignored)
//! - Match path prefix (case-sensitive)
//! - Match method set and header presence/value
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Matchers are total: a missing or unreadable header is a non-match
//! - Matchers only read the request; they never hold state between calls
//! - Empty `AndMatcher` = always matches (wildcard)

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Method, Request};

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

/// Host the request addresses, lowercased and without port.
pub(crate) fn request_host(req: &Request<Body>) -> Option<String> {
    let raw = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().host().map(str::to_string))?;
    let host = match raw.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => raw.as_str(),
    };
    Some(host.to_ascii_lowercase())
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_ascii_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        request_host(req)
            .map(|h| h == self.expected_host)
            .unwrap_or(false)
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        req.uri().path().starts_with(&self.prefix)
    }
}

/// Matches any of a set of methods.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.methods.contains(req.method())
    }
}

/// Matches a header's presence, or its exact value when one is given.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: HeaderName,
    value: Option<HeaderValue>,
}

impl HeaderMatcher {
    pub fn present(name: HeaderName) -> Self {
        Self { name, value: None }
    }

    pub fn equals(name: HeaderName, value: HeaderValue) -> Self {
        Self {
            name,
            value: Some(value),
        }
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let mut values = req.headers().get_all(&self.name).iter().peekable();
        match &self.value {
            None => values.peek().is_some(),
            Some(expected) => values.any(|v| v == expected),
        }
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug, Clone, Default)]
pub struct AndMatcher {
    matchers: Vec<Arc<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Arc<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}

/// Matcher backed by a plain function.
pub struct FnMatcher<F> {
    name: &'static str,
    f: F,
}

impl<F> FnMatcher<F> {
    pub fn new(name: &'static str, f: F) -> Self
    where
        F: Fn(&Request<Body>) -> bool + Send + Sync + 'static,
    {
        Self { name, f }
    }
}

impl<F> fmt::Debug for FnMatcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMatcher").field("name", &self.name).finish()
    }
}

impl<F> Matcher for FnMatcher<F>
where
    F: Fn(&Request<Body>) -> bool + Send + Sync + 'static,
{
    fn matches(&self, req: &Request<Body>) -> bool {
        (self.f)(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_host(host: &str) -> Request<Body> {
        Request::builder()
            .header("Host", host)
            .body(Body::default())
            .unwrap()
    }

    #[test]
    fn test_host_matcher() {
        let matcher = HostMatcher::new("example.com");

        assert!(matcher.matches(&with_host("example.com")));
        assert!(matcher.matches(&with_host("EXAMPLE.COM"))); // Case insensitive
        assert!(matcher.matches(&with_host("example.com:8080")));
        assert!(!matcher.matches(&with_host("other.com")));

        let absolute = Request::builder()
            .uri("http://Example.com:9000/x")
            .body(Body::default())
            .unwrap();
        assert!(matcher.matches(&absolute));
    }

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/api");

        let req1 = Request::builder()
            .uri("http://example.com/api/v1")
            .body(Body::default())
            .unwrap();
        assert!(matcher.matches(&req1));

        let req2 = Request::builder()
            .uri("http://example.com/images")
            .body(Body::default())
            .unwrap();
        assert!(!matcher.matches(&req2));
    }

    #[test]
    fn test_method_and_header_matchers() {
        let req = Request::builder()
            .method(Method::POST)
            .header("x-tenant", "blue")
            .body(Body::default())
            .unwrap();

        assert!(MethodMatcher::new([Method::GET, Method::POST]).matches(&req));
        assert!(!MethodMatcher::new([Method::GET]).matches(&req));

        let name = HeaderName::from_static("x-tenant");
        assert!(HeaderMatcher::present(name.clone()).matches(&req));
        assert!(HeaderMatcher::equals(name.clone(), HeaderValue::from_static("blue")).matches(&req));
        assert!(!HeaderMatcher::equals(name, HeaderValue::from_static("red")).matches(&req));
        assert!(!HeaderMatcher::present(HeaderName::from_static("x-missing")).matches(&req));
    }

    #[test]
    fn test_and_matcher() {
        let req = Request::builder()
            .uri("/api/users")
            .header("Host", "example.com")
            .body(Body::default())
            .unwrap();

        assert!(AndMatcher::default().matches(&req));

        let both = AndMatcher::new(vec![
            Arc::new(HostMatcher::new("example.com")),
            Arc::new(PathPrefixMatcher::new("/api")),
        ]);
        assert!(both.matches(&req));

        let one_fails = AndMatcher::new(vec![
            Arc::new(HostMatcher::new("example.com")),
            Arc::new(FnMatcher::new("never", |_| false)),
        ]);
        assert!(!one_fails.matches(&req));
    }
}
