//! Per-request state shared by every handler of one request.
//!
//! # Responsibilities
//! - Own the inbound request and the response slot
//! - Carry the failure value into "error" phase handlers
//! - Record the original host, request ID and client address
//! - Pin one phase-table snapshot per visited layer
//! - Remember each gate's decision so every phase sees the same one
//!
//! # Design Decisions
//! - Nothing in an `Exchange` is shared with other requests
//! - A handler "writes" a response by filling the slot; later writes win

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, Response},
};

use crate::error::HandlerError;
use crate::http::request::{request_id_of, X_REQUEST_ID};
use crate::pipeline::arena::LayerId;
use crate::pipeline::layer::{Layer, PhaseTable};
use crate::routing::{Matcher, Params};

/// A request travelling through the pipeline.
pub struct Exchange {
    request: Request<Body>,
    response: Option<Response<Body>>,
    failure: Option<HandlerError>,
    params: Params,
    original_host: Option<String>,
    request_id: String,
    client_addr: Option<SocketAddr>,
    responses_written: u32,
    pinned: HashMap<LayerId, Arc<PhaseTable>>,
    gates: HashMap<LayerId, bool>,
    started: Instant,
}

impl Exchange {
    pub fn new(mut request: Request<Body>) -> Self {
        let request_id = request_id_of(&request);
        if !request.headers().contains_key(X_REQUEST_ID) {
            if let Ok(value) = request_id.parse() {
                request.headers_mut().insert(X_REQUEST_ID, value);
            }
        }

        let original_host = request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| request.uri().authority().map(|a| a.to_string()));

        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            request,
            response: None,
            failure: None,
            params: Params::default(),
            original_host,
            request_id,
            client_addr,
            responses_written: 0,
            pinned: HashMap::new(),
            gates: HashMap::new(),
            started: Instant::now(),
        }
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<Body> {
        &mut self.request
    }

    /// Take the inbound body, leaving an empty one in its place.
    pub fn take_body(&mut self) -> Body {
        std::mem::replace(self.request.body_mut(), Body::empty())
    }

    /// Host the client originally addressed, before any rewrite.
    pub fn original_host(&self) -> Option<&str> {
        self.original_host.as_deref()
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Write the response for this request.
    pub fn respond(&mut self, response: Response<Body>) {
        self.responses_written += 1;
        self.response = Some(response);
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub fn response(&self) -> Option<&Response<Body>> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut Response<Body>> {
        self.response.as_mut()
    }

    pub fn take_response(&mut self) -> Option<Response<Body>> {
        self.response.take()
    }

    pub(crate) fn responses_written(&self) -> u32 {
        self.responses_written
    }

    /// Failure being handled by the current "error" phase, if any.
    pub fn failure(&self) -> Option<&HandlerError> {
        self.failure.as_ref()
    }

    /// Claim the failure, marking it as handled.
    pub fn take_failure(&mut self) -> Option<HandlerError> {
        self.failure.take()
    }

    pub(crate) fn set_failure(&mut self, failure: HandlerError) {
        self.failure = Some(failure);
    }

    /// Path parameters captured by the matched route.
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Snapshot of `layer`'s table for this request.
    ///
    /// The first visit pins the current table; every later visit (including
    /// the response and error phases) reuses it.
    pub(crate) fn pin(&mut self, layer: &Layer) -> Arc<PhaseTable> {
        self.pinned
            .entry(layer.id())
            .or_insert_with(|| layer.snapshot())
            .clone()
    }

    /// Decision of the gate in front of layer `gate` for this request.
    ///
    /// `matcher` runs on the first visit only; later phases reuse the
    /// answer even if the gate's rules changed in between.
    pub(crate) fn decide(&mut self, gate: LayerId, matcher: &dyn Matcher) -> bool {
        if let Some(&matched) = self.gates.get(&gate) {
            return matched;
        }
        let matched = matcher.matches(&self.request);
        self.gates.insert(gate, matched);
        matched
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("request_id", &self.request_id)
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("has_response", &self.response.is_some())
            .field("failure", &self.failure)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn request(uri: &str, host: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header(header::HOST, host);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_original_host_from_header() {
        let ex = Exchange::new(request("/x", Some("api.example.com:8080")));
        assert_eq!(ex.original_host(), Some("api.example.com:8080"));
    }

    #[test]
    fn test_original_host_from_absolute_uri() {
        let ex = Exchange::new(request("http://upstream.local/x", None));
        assert_eq!(ex.original_host(), Some("upstream.local"));
    }

    #[test]
    fn test_request_id_generated_and_attached() {
        let ex = Exchange::new(request("/x", None));
        assert!(!ex.request_id().is_empty());
        assert_eq!(
            ex.request().headers().get(X_REQUEST_ID).unwrap(),
            ex.request_id()
        );
    }

    #[test]
    fn test_request_id_preserved() {
        let req = Request::builder()
            .uri("/x")
            .header(X_REQUEST_ID, "abc-123")
            .body(Body::empty())
            .unwrap();
        let ex = Exchange::new(req);
        assert_eq!(ex.request_id(), "abc-123");
    }

    #[test]
    fn test_respond_counts_writes() {
        let mut ex = Exchange::new(request("/x", None));
        assert!(!ex.has_response());
        ex.respond(Response::builder().status(StatusCode::OK).body(Body::empty()).unwrap());
        ex.respond(Response::builder().status(StatusCode::CREATED).body(Body::empty()).unwrap());
        assert_eq!(ex.responses_written(), 2);
        assert_eq!(ex.take_response().unwrap().status(), StatusCode::CREATED);
    }
}
