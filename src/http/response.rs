//! Response builders shared by the pipeline, the forwarder and plugins.
//!
//! # Design Decisions
//! - Error bodies are short plain text on the proxy port; the admin API
//!   uses the JSON envelope from `ProxyError`
//! - Building a response from a known status and header never fails, so
//!   the builders return `Response` directly

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};

/// Plain-text response.
pub fn text_response(status: StatusCode, body: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// JSON response from an already-serialized value.
pub fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Response used when the proxy itself fails a request.
pub fn error_response(status: StatusCode) -> Response<Body> {
    text_response(
        status,
        status.canonical_reason().unwrap_or("Error").to_string(),
    )
}
