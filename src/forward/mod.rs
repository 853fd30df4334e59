//! Upstream forwarding.
//!
//! # Data Flow
//! ```text
//! root layer final handler
//!     → forwarder.rs (target resolution, timeout, streaming)
//!     → headers.rs (hop-by-hop, X-Forwarded-*, Via)
//!     → upstream
//! ```
//!
//! # Design Decisions
//! - No retries: a failed attempt is a 502, retry policy belongs in a plugin
//! - Bodies are streamed in both directions, never buffered

pub mod forwarder;
pub mod headers;

pub use forwarder::{Forwarder, Target};
