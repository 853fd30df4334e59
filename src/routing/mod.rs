//! Routing subsystem: predicates, gates and the method/pattern router.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, host, path, headers)
//!     → matcher.rs (pure predicates, AND-composed)
//!     → mux.rs (gate: matcher true → nested layer, false → continue)
//!     → router.rs (Tail of root "request" phase)
//!         method bucket → pattern.rs (literal > :param > *)
//!         match   → route layer (route middleware → route handler)
//!         no match → continue to the final handler
//! ```
//!
//! # Design Decisions
//! - No regex in hot path (prefix and segment matching only)
//! - Deterministic: same input always matches same route
//! - Matchers never fail; an unreadable header is just a non-match

pub mod matcher;
pub mod mux;
pub mod pattern;
pub mod router;

pub use matcher::{
    AndMatcher, FnMatcher, HeaderMatcher, HostMatcher, Matcher, MethodMatcher, PathPrefixMatcher,
};
pub use mux::Mux;
pub use pattern::{Params, Pattern};
pub use router::{Route, RouteHandle, Router};
