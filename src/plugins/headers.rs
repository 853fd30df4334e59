//! `headers` plugin: set fixed headers on requests and responses.
//!
//! ```json
//! { "request": { "x-tenant": "blue" }, "response": { "cache-control": "no-store" } }
//! ```

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::error::{BoxError, HandlerResult};
use crate::pipeline::{BoxFuture, Exchange, Next};
use crate::plugins::Plugin;
use crate::registry::{FactoryInfo, Param, Registry};

type HeaderList = Vec<(HeaderName, HeaderValue)>;

pub struct SetHeaders {
    request: HeaderList,
    response: HeaderList,
}

impl SetHeaders {
    pub fn new(request: HeaderList, response: HeaderList) -> Self {
        Self { request, response }
    }

    fn from_config(config: &Value) -> Result<Self, BoxError> {
        let request = parse_headers(config, "request")?;
        let response = parse_headers(config, "response")?;
        if request.is_empty() && response.is_empty() {
            return Err("at least one of 'request' or 'response' must set a header".into());
        }
        Ok(Self::new(request, response))
    }
}

fn parse_headers(config: &Value, field: &str) -> Result<HeaderList, BoxError> {
    let map = match config.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(format!("'{field}' must be an object").into()),
    };

    map.iter()
        .map(|(name, value)| {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| format!("invalid header name '{name}': {e}"))?;
            let value = value
                .as_str()
                .ok_or_else(|| format!("header '{name}' must be a string"))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| format!("invalid value for header '{name}': {e}"))?;
            Ok((name, value))
        })
        .collect()
}

fn apply(headers: &mut HeaderMap, list: &HeaderList) {
    for (name, value) in list {
        headers.insert(name.clone(), value.clone());
    }
}

impl Plugin for SetHeaders {
    fn on_request<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        apply(exchange.request_mut().headers_mut(), &self.request);
        next.run(exchange)
    }

    fn on_response<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        if let Some(response) = exchange.response_mut() {
            apply(response.headers_mut(), &self.response);
        }
        next.run(exchange)
    }
}

pub fn register(registry: &Registry<Arc<dyn Plugin>>) {
    registry.register(
        FactoryInfo::new("headers", "Sets fixed request and response headers")
            .param(Param::optional(
                "request",
                "object",
                "Headers set on the request before it is forwarded",
                r#"{"x-tenant": "blue"}"#,
            ))
            .param(Param::optional(
                "response",
                "object",
                "Headers set on the response before it is returned",
                r#"{"cache-control": "no-store"}"#,
            )),
        |config: &Value| Ok(Arc::new(SetHeaders::from_config(config)?) as Arc<dyn Plugin>),
    );
}
