//! Error kinds shared by the pipeline, the scope hierarchy and the admin surface.
//!
//! # Design Decisions
//! - Administrative failures (`UnknownFactory`, `InvalidConfig`, `NotFound`,
//!   `RemovalFailed`) are returned synchronously to the caller
//! - Per-request failures travel as [`HandlerError`] through the phase engine
//!   and never cross into sibling requests
//! - Matching never fails: rules and matchers are total functions

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Boxed error usable as the source of a [`HandlerError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the proxy core.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A registry lookup referenced a name that was never registered.
    #[error("unknown {kind} factory '{name}'")]
    UnknownFactory { kind: &'static str, name: String },

    /// A factory rejected its configuration object.
    #[error("invalid configuration for {kind} '{name}': {reason}")]
    InvalidConfig {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// A referenced instance, scope, plugin or rule does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// The forwarder could not obtain a valid upstream response.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A handler failed and no error-phase handler recovered it.
    #[error(transparent)]
    HandlerFailure(#[from] HandlerError),

    /// The layer hierarchy would violate one of its invariants.
    #[error("structural corruption: {0}")]
    StructuralCorruption(String),

    /// A structural removal could not be completed.
    #[error("cannot remove {kind} '{id}'")]
    RemovalFailed { kind: &'static str, id: String },

    /// A handler of a kind the target registration slot does not accept.
    #[error("unsupported handler: {0}")]
    UnsupportedHandler(String),
}

impl ProxyError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable machine-readable code used in JSON error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::UnknownFactory { .. } => "UNKNOWN_FACTORY",
            ProxyError::InvalidConfig { .. } => "INVALID_CONFIG",
            ProxyError::NotFound { .. } => "NOT_FOUND",
            ProxyError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            ProxyError::HandlerFailure(_) => "HANDLER_FAILURE",
            ProxyError::StructuralCorruption(_) => "STRUCTURAL_CORRUPTION",
            ProxyError::RemovalFailed { .. } => "REMOVAL_FAILED",
            ProxyError::UnsupportedHandler(_) => "UNSUPPORTED_HANDLER",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UnknownFactory { .. } | ProxyError::NotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ProxyError::InvalidConfig { .. } => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Failure raised by a handler while a phase is executing.
///
/// Routed to the "error" phase of the layer that raised it, then outward.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    status: Option<StatusCode>,
    #[source]
    source: Option<BoxError>,
    /// Number of nested layers this error still has to unwind through
    /// before reaching the layer whose handler raised it.
    pub(crate) escalations: u32,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            source: None,
            escalations: 0,
        }
    }

    /// Wrap an underlying error.
    pub fn from_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::new(message)
        }
    }

    /// Suggest the status used if the failure ends up unhandled.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Result type returned by every pipeline handler.
pub type HandlerResult = Result<(), HandlerError>;
