//! Handler trait and the explicit continuation passed to every handler.

use std::fmt;
use std::sync::Arc;

use crate::error::HandlerResult;
use crate::pipeline::exchange::Exchange;
use crate::pipeline::layer::Entry;
use crate::pipeline::phase::Phase;

/// Boxed, sendable future returned by handlers.
pub type BoxFuture<'a, T> = futures_util::future::BoxFuture<'a, T>;

/// A unit of work in a phase.
///
/// A handler either calls `next.run(exchange)` to continue the chain or
/// returns without calling it, which stops the chain at this point.
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>)
        -> BoxFuture<'a, HandlerResult>;
}

/// What happens once the current handler list is exhausted.
pub(crate) enum Tail<'a> {
    /// Nothing left to run.
    Done,
    /// Resume the enclosing layer's chain past the nested entry.
    Resume(Box<Next<'a>>),
    /// Run the terminal handler.
    Final(Arc<dyn Handler>),
}

/// The remainder of the chain, handed to the current handler.
pub struct Next<'a> {
    phase: &'a Phase,
    entries: &'a [Entry],
    tail: Tail<'a>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(phase: &'a Phase, entries: &'a [Entry], tail: Tail<'a>) -> Self {
        Self {
            phase,
            entries,
            tail,
        }
    }

    /// A continuation that does nothing.
    pub fn end(phase: &'a Phase) -> Self {
        Self::new(phase, &[], Tail::Done)
    }

    /// Phase currently executing.
    pub fn phase(&self) -> &'a Phase {
        self.phase
    }

    /// Continue with the rest of the chain.
    pub fn run<'b>(self, exchange: &'b mut Exchange) -> BoxFuture<'b, HandlerResult>
    where
        'a: 'b,
    {
        Box::pin(async move {
            let Next {
                phase,
                entries,
                tail,
            } = self;

            if let Some((entry, rest)) = entries.split_first() {
                return entry.dispatch(exchange, Next::new(phase, rest, tail)).await;
            }

            match tail {
                Tail::Done => Ok(()),
                Tail::Resume(outer) => (*outer).run(exchange).await.map_err(|mut err| {
                    // Raised outside the nested layer: let it unwind past it.
                    err.escalations += 1;
                    err
                }),
                Tail::Final(handler) => handler.handle(exchange, Next::end(phase)).await,
            }
        })
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("phase", self.phase)
            .field("remaining", &self.entries.len())
            .finish()
    }
}

/// Adapter turning an async closure into a [`Handler`].
///
/// ```ignore
/// let hello = FnHandler::shared(|exchange, _next| {
///     Box::pin(async move {
///         exchange.respond(text_response(StatusCode::OK, "hello"));
///         Ok(())
///     })
/// });
/// ```
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange, Next<'a>) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Self(f)
    }

    pub fn shared(f: F) -> Arc<dyn Handler>
    where
        F: for<'a> Fn(&'a mut Exchange, Next<'a>) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self(f))
    }
}

impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Exchange, Next<'a>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    fn handle<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        (self.0)(exchange, next)
    }
}

/// Handler that only observes the exchange and then continues.
///
/// Used for simple synchronous hooks such as counters or header tweaks.
pub struct Tap<F>(F);

impl<F> Tap<F> {
    pub fn shared(f: F) -> Arc<dyn Handler>
    where
        F: Fn(&mut Exchange) + Send + Sync + 'static,
    {
        Arc::new(Self(f))
    }
}

impl<F> Handler for Tap<F>
where
    F: Fn(&mut Exchange) + Send + Sync + 'static,
{
    fn handle<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        (self.0)(exchange);
        next.run(exchange)
    }
}
