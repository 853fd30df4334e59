//! Phase engine.
//!
//! # Data Flow
//! ```text
//! Proxy::handle(request)
//!     → exchange.rs (request, response slot, failure slot, pinned snapshots)
//!     → layer.rs: run("request")
//!         Head entries → Normal entries → Tail entries
//!         each entry: plain handler | nested layer | gated layer (mux/scope)
//!         list exhausted → parent continuation, or the final handler
//!     → layer.rs: run("response")
//!
//! Handler failure:
//!     error raised in layer L → L's "error" phase → unrecovered → L's parent ...
//! ```
//!
//! # Design Decisions
//! - Handlers receive an explicit [`Next`]; not calling it short-circuits
//! - Each layer publishes an immutable phase table through `ArcSwap`;
//!   mutations build a new table under a writer lock and swap it in
//! - A request pins the first table it sees for every layer, so the request
//!   and response phases observe the same topology
//! - Parent links live in [`LayerArena`] as IDs and are checked for cycles

pub mod arena;
pub mod exchange;
pub mod handler;
pub mod layer;
pub mod phase;

pub use arena::{LayerArena, LayerId};
pub use exchange::Exchange;
pub use handler::{BoxFuture, FnHandler, Handler, Next, Tap};
pub use layer::{EntryId, HandlerKind, Layer, PhaseTable};
pub use phase::{Phase, Priority};
