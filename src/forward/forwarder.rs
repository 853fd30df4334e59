//! The default terminal handler: reverse-proxy to the upstream.
//!
//! # Data Flow
//! ```text
//! Exchange (request, original host, client addr)
//!     → loop check (Via)
//!     → upstream URI: fixed target, or derived from the request itself
//!     → header rewrite (hop-by-hop, X-Forwarded-*, Via, Host)
//!     → hyper client, bounded by timeout
//!         ok      → response streamed back as-is
//!         failure → 502 Bad Gateway, never retried
//! ```

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, HeaderValue, Request, Response, StatusCode, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::ForwardConfig;
use crate::error::{HandlerResult, ProxyError};
use crate::forward::headers;
use crate::http::response::text_response;
use crate::observability::metrics;
use crate::pipeline::{BoxFuture, Exchange, Handler, Next};

/// Where requests are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Wherever the request points: its absolute URI, else its Host header.
    Derived,
    /// Always this scheme and authority; a non-root path is prefixed.
    Fixed(Uri),
}

/// Forwarding failure, tagged for metrics.
struct Failure {
    reason: &'static str,
    detail: String,
}

impl Failure {
    fn new(reason: &'static str, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    target: Target,
    pass_host_header: bool,
    timeout: Duration,
    via: String,
}

impl Forwarder {
    /// Forwarder deriving the upstream from each request.
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            target: Target::Derived,
            pass_host_header: true,
            timeout: Duration::from_secs(30),
            via: "1.1 scoped-proxy".to_string(),
        }
    }

    /// Forwarder sending everything to `uri`.
    pub fn to(uri: &str) -> Result<Self, ProxyError> {
        Ok(Self::new().with_target(Target::Fixed(parse_target(uri)?)))
    }

    pub fn from_config(config: &ForwardConfig) -> Result<Self, ProxyError> {
        let target = match &config.target {
            Some(uri) => Target::Fixed(parse_target(uri)?),
            None => Target::Derived,
        };
        Ok(Self::new()
            .with_target(target)
            .with_pass_host_header(config.pass_host_header)
            .with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_pass_host_header(mut self, pass: bool) -> Self {
        self.pass_host_header = pass;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Token this proxy appends to `Via` and uses for loop detection.
    pub fn with_via(mut self, pseudonym: &str) -> Self {
        self.via = format!("1.1 {pseudonym}");
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    fn upstream_uri(&self, exchange: &Exchange) -> Result<Uri, Failure> {
        let uri = exchange.request().uri();
        let path = uri.path_and_query().map(PathAndQuery::as_str).unwrap_or("/");

        let (scheme, authority, prefix) = match &self.target {
            Target::Fixed(target) => (
                target.scheme().cloned().unwrap_or(Scheme::HTTP),
                target.authority().cloned(),
                target.path().trim_end_matches('/'),
            ),
            Target::Derived => {
                let authority = match uri.authority() {
                    Some(authority) => Some(authority.clone()),
                    None => exchange
                        .original_host()
                        .and_then(|host| host.parse::<Authority>().ok()),
                };
                (uri.scheme().cloned().unwrap_or(Scheme::HTTP), authority, "")
            }
        };
        let authority =
            authority.ok_or_else(|| Failure::new("invalid_target", "request has no target host"))?;

        Uri::builder()
            .scheme(scheme)
            .authority(authority)
            .path_and_query(format!("{prefix}{path}"))
            .build()
            .map_err(|e| Failure::new("invalid_target", e.to_string()))
    }

    fn prepare(&self, exchange: &mut Exchange) -> Result<Request<Body>, Failure> {
        if headers::has_via(exchange.request().headers(), &self.via) {
            return Err(Failure::new("loop", "request already passed through this proxy"));
        }
        let uri = self.upstream_uri(exchange)?;

        let client = exchange.client_addr();
        let host = exchange.original_host().map(str::to_string);
        let body = exchange.take_body();
        let source = exchange.request();

        let mut request = Request::new(body);
        *request.method_mut() = source.method().clone();
        *request.headers_mut() = source.headers().clone();

        let map = request.headers_mut();
        headers::strip_hop_by_hop(map);
        headers::add_forwarded(map, client, host.as_deref());
        headers::append_via(map, &self.via);

        // The client sets Host from the URI when none is present.
        map.remove(header::HOST);
        if self.pass_host_header {
            if let Some(value) = host.as_deref().and_then(|h| HeaderValue::from_str(h).ok()) {
                map.insert(header::HOST, value);
            }
        }

        *request.uri_mut() = uri;
        Ok(request)
    }

    async fn forward(&self, exchange: &mut Exchange) -> Result<Response<Body>, Failure> {
        let request = self.prepare(exchange)?;
        let upstream = request.uri().to_string();
        let started = Instant::now();

        let response = match tokio::time::timeout(self.timeout, self.client.request(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(Failure::new("connect", format!("{upstream}: {e}"))),
            Err(_) => {
                return Err(Failure::new(
                    "timeout",
                    format!("{upstream}: no response within {:?}", self.timeout),
                ))
            }
        };

        tracing::debug!(
            request_id = %exchange.request_id(),
            upstream = %upstream,
            status = %response.status(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Upstream responded"
        );

        let (mut parts, body) = response.into_parts();
        headers::strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_target(raw: &str) -> Result<Uri, ProxyError> {
    let invalid = |reason: String| ProxyError::InvalidConfig {
        kind: "forward",
        name: raw.to_string(),
        reason,
    };
    let uri: Uri = raw.parse().map_err(|e| invalid(format!("{e}")))?;
    if uri.authority().is_none() {
        return Err(invalid("target must be an absolute URI".to_string()));
    }
    match uri.scheme_str() {
        None | Some("http") => Ok(uri),
        Some(other) => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

impl Handler for Forwarder {
    fn handle<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        _next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            match self.forward(exchange).await {
                Ok(response) => exchange.respond(response),
                Err(failure) => {
                    let err = ProxyError::UpstreamUnavailable(failure.detail);
                    tracing::warn!(
                        request_id = %exchange.request_id(),
                        reason = failure.reason,
                        error = %err,
                        "Forwarding failed"
                    );
                    metrics::record_upstream_error(failure.reason);
                    exchange.respond(text_response(StatusCode::BAD_GATEWAY, "Bad Gateway"));
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(uri: &str, host: Option<&str>) -> Exchange {
        let mut builder = Request::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header("host", host);
        }
        Exchange::new(builder.body(Body::empty()).unwrap())
    }

    #[test]
    fn test_derived_target_uses_host() {
        let forwarder = Forwarder::new();
        let uri = forwarder
            .upstream_uri(&exchange("/a?b=1", Some("backend:9000")))
            .ok()
            .unwrap();
        assert_eq!(uri.to_string(), "http://backend:9000/a?b=1");

        let uri = forwarder
            .upstream_uri(&exchange("http://other:81/x", Some("ignored")))
            .ok()
            .unwrap();
        assert_eq!(uri.to_string(), "http://other:81/x");
    }

    #[test]
    fn test_fixed_target_prefixes_path() {
        let forwarder = Forwarder::to("http://10.0.0.2:8000/base/").unwrap();
        let uri = forwarder
            .upstream_uri(&exchange("/users?id=3", Some("public.example")))
            .ok()
            .unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.2:8000/base/users?id=3");
    }

    #[test]
    fn test_invalid_targets() {
        assert!(matches!(
            Forwarder::to("/relative"),
            Err(ProxyError::InvalidConfig { .. })
        ));
        assert!(Forwarder::to("https://secure.example").is_err());
        assert!(Forwarder::new().upstream_uri(&exchange("/x", None)).is_err());
    }

    #[test]
    fn test_prepare_rewrites_headers() {
        let forwarder = Forwarder::to("http://127.0.0.1:1")
            .unwrap()
            .with_pass_host_header(false);
        let mut ex = exchange("/", Some("public.example"));
        ex.request_mut()
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));

        let request = forwarder.prepare(&mut ex).ok().unwrap();
        assert!(request.headers().get(header::HOST).is_none());
        assert!(request.headers().get(header::CONNECTION).is_none());
        assert_eq!(request.headers()["x-forwarded-host"], "public.example");
        assert_eq!(request.headers()[header::VIA], "1.1 scoped-proxy");
    }

    #[tokio::test]
    async fn test_loop_and_unreachable_upstream_are_bad_gateway() {
        let forwarder = Forwarder::to("http://127.0.0.1:1")
            .unwrap()
            .with_timeout(Duration::from_secs(2));

        let mut ex = exchange("/", Some("a"));
        let phase = crate::pipeline::Phase::Request;
        forwarder.handle(&mut ex, Next::end(&phase)).await.unwrap();
        assert_eq!(ex.response().unwrap().status(), StatusCode::BAD_GATEWAY);

        let mut ex = exchange("/", Some("a"));
        ex.request_mut()
            .headers_mut()
            .insert(header::VIA, HeaderValue::from_static("1.1 scoped-proxy"));
        assert!(matches!(
            forwarder.prepare(&mut ex),
            Err(Failure { reason: "loop", .. })
        ));
    }
}
