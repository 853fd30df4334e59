//! `ratelimit` plugin: per-client token bucket.
//!
//! # Design Decisions
//! - One bucket per key, refilled lazily on access
//! - Burst defaults to twice the sustained rate
//! - Requests with no usable key (no client address, header absent) share
//!   a single anonymous bucket
//! - A bucket idle for `burst / rps` seconds is full again, so it is
//!   dropped on the next sweep; the map only holds recently active keys

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{HeaderName, StatusCode};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{BoxError, HandlerResult};
use crate::http::response::text_response;
use crate::observability::metrics;
use crate::pipeline::{BoxFuture, Exchange, Next};
use crate::plugins::Plugin;
use crate::registry::{str_field, FactoryInfo, Param, Registry};

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// What identifies a client.
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeySource {
    ClientIp,
    Header(HeaderName),
}

impl KeySource {
    fn parse(raw: &str) -> Result<Self, BoxError> {
        if raw.eq_ignore_ascii_case("ip") {
            return Ok(Self::ClientIp);
        }
        match raw.split_once(':') {
            Some(("header", name)) => HeaderName::from_bytes(name.trim().as_bytes())
                .map(Self::Header)
                .map_err(|e| format!("invalid header name '{name}': {e}").into()),
            _ => Err(format!("unknown key '{raw}', expected 'ip' or 'header:<name>'").into()),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::ClientIp => "ip",
            Self::Header(_) => "header",
        }
    }

    fn extract(&self, exchange: &Exchange) -> String {
        let key = match self {
            Self::ClientIp => exchange.client_addr().map(|addr| addr.ip().to_string()),
            Self::Header(name) => exchange
                .request()
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        };
        key.unwrap_or_else(|| "anonymous".to_string())
    }
}

struct Buckets {
    by_key: HashMap<String, TokenBucket>,
    last_sweep: Instant,
}

pub struct RateLimit {
    rps: f64,
    burst: f64,
    key: KeySource,
    idle_after: Duration,
    buckets: Mutex<Buckets>,
}

impl RateLimit {
    fn from_config(config: &Value) -> Result<Self, BoxError> {
        let rps = positive(config, "rps")?.ok_or("'rps' is required")?;
        let burst = positive(config, "burst")?.unwrap_or(rps * 2.0);
        let key = KeySource::parse(str_field(config, "key")?.unwrap_or("ip"))?;

        Ok(Self {
            rps,
            burst,
            key,
            idle_after: Duration::from_secs_f64(burst / rps),
            buckets: Mutex::new(Buckets {
                by_key: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        })
    }

    fn check(&self, key: String) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: String, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();
        if now.saturating_duration_since(buckets.last_sweep) >= self.idle_after {
            let idle_after = self.idle_after;
            buckets
                .by_key
                .retain(|_, bucket| now.saturating_duration_since(bucket.last_update) < idle_after);
            buckets.last_sweep = now;
        }

        let burst = self.burst;
        buckets
            .by_key
            .entry(key)
            .or_insert_with(|| TokenBucket::new(burst, now))
            .try_acquire(self.burst, self.rps, now)
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.buckets.lock().by_key.len()
    }
}

fn positive(config: &Value, name: &str) -> Result<Option<f64>, BoxError> {
    match config.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_f64() {
            Some(n) if n > 0.0 => Ok(Some(n)),
            _ => Err(format!("'{name}' must be a positive number").into()),
        },
    }
}

impl Plugin for RateLimit {
    fn on_request<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        let key = self.key.extract(exchange);
        if self.check(key.clone()) {
            return next.run(exchange);
        }

        tracing::warn!(
            client = %key,
            request_id = %exchange.request_id(),
            rps = self.rps,
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(self.key.label());
        exchange.respond(text_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded",
        ));
        Box::pin(async { Ok(()) })
    }
}

pub fn register(registry: &Registry<Arc<dyn Plugin>>) {
    registry.register(
        FactoryInfo::new("ratelimit", "Token-bucket rate limiting per client")
            .param(Param::required("rps", "number", "Sustained requests per second", "10"))
            .param(Param::optional("burst", "number", "Bucket capacity (default 2 x rps)", "20"))
            .param(Param::optional(
                "key",
                "string",
                "Client key: 'ip' or 'header:<name>'",
                "header:x-api-key",
            )),
        |config: &Value| Ok(Arc::new(RateLimit::from_config(config)?) as Arc<dyn Plugin>),
    );
}
