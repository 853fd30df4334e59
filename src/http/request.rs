//! Request identification helpers.
//!
//! # Responsibilities
//! - Name the request ID header
//! - Read an inbound request ID or mint a new one (UUID v4)
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A client-supplied ID is kept so traces can span several hops

use axum::body::Body;
use axum::http::Request;
use uuid::Uuid;

/// Header carrying the request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// The request's ID, or a fresh UUID when it has none.
pub fn request_id_of(req: &Request<Body>) -> String {
    req.headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_id_kept() {
        let req = Request::builder()
            .header(X_REQUEST_ID, "req-1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_id_of(&req), "req-1");
    }

    #[test]
    fn test_missing_id_generated() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let id = request_id_of(&req);
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
