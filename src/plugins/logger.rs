//! `logger` plugin: one structured log line per request and per response.

use std::sync::Arc;

use serde_json::Value;
use tracing::Level;

use crate::error::{BoxError, HandlerResult};
use crate::pipeline::{BoxFuture, Exchange, Next};
use crate::plugins::Plugin;
use crate::registry::{str_field, FactoryInfo, Param, Registry};

pub struct Logger {
    level: Level,
}

impl Logger {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn from_config(config: &Value) -> Result<Self, BoxError> {
        let level = match str_field(config, "level")? {
            None => Level::INFO,
            Some(raw) => raw
                .parse::<Level>()
                .map_err(|_| format!("unknown log level '{raw}'"))?,
        };
        Ok(Self::new(level))
    }
}

// `tracing` needs the level at the call site, so dispatch by hand.
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            Level::TRACE => tracing::trace!($($arg)+),
            Level::DEBUG => tracing::debug!($($arg)+),
            Level::INFO => tracing::info!($($arg)+),
            Level::WARN => tracing::warn!($($arg)+),
            _ => tracing::error!($($arg)+),
        }
    };
}

impl Plugin for Logger {
    fn on_request<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        let req = exchange.request();
        log_at!(
            self.level,
            request_id = %exchange.request_id(),
            method = %req.method(),
            path = %req.uri().path(),
            host = exchange.original_host().unwrap_or("-"),
            client = ?exchange.client_addr(),
            "Request"
        );
        next.run(exchange)
    }

    fn on_response<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        let status = exchange.response().map(|r| r.status().as_u16());
        log_at!(
            self.level,
            request_id = %exchange.request_id(),
            status = ?status,
            elapsed_ms = exchange.started().elapsed().as_millis() as u64,
            "Response"
        );
        next.run(exchange)
    }

    fn on_error<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        if let Some(failure) = exchange.failure() {
            tracing::warn!(
                request_id = %exchange.request_id(),
                error = %failure,
                "Request failed"
            );
        }
        next.run(exchange)
    }
}

pub fn register(registry: &Registry<Arc<dyn Plugin>>) {
    registry.register(
        FactoryInfo::new("logger", "Logs every request and response passing through the scope")
            .param(Param::optional(
                "level",
                "string",
                "Log level (trace, debug, info, warn, error)",
                "info",
            )),
        |config: &Value| Ok(Arc::new(Logger::from_config(config)?) as Arc<dyn Plugin>),
    );
}
