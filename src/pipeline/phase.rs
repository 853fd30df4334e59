//! Phase names and priority buckets.

use std::fmt;
use std::sync::Arc;

/// A named stage of request processing.
///
/// The three built-in phases are always available; any other name is a
/// custom phase that only runs when explicitly requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Phase {
    Request,
    Response,
    Error,
    Custom(Arc<str>),
}

impl Phase {
    pub fn new(name: &str) -> Self {
        match name {
            "request" => Phase::Request,
            "response" => Phase::Response,
            "error" => Phase::Error,
            other => Phase::Custom(Arc::from(other)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Phase::Request => "request",
            Phase::Response => "response",
            Phase::Error => "error",
            Phase::Custom(name) => name,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Phase::Error)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Phase {
    fn from(name: &str) -> Self {
        Phase::new(name)
    }
}

/// Ordering class of a handler within a phase.
///
/// `Head < Normal < Tail`; registration order is kept within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Head,
    #[default]
    Normal,
    Tail,
}
