//! `static` plugin: answer every request in the scope with a fixed response.

use std::sync::Arc;

use axum::body::Body;
use bytes::Bytes;
use axum::http::{header, HeaderValue, Response, StatusCode};
use serde_json::Value;

use crate::error::{BoxError, HandlerResult};
use crate::pipeline::{BoxFuture, Exchange, Next};
use crate::plugins::Plugin;
use crate::registry::{str_field, FactoryInfo, Param, Registry};

pub struct StaticResponse {
    status: StatusCode,
    body: Bytes,
    content_type: HeaderValue,
}

impl StaticResponse {
    fn from_config(config: &Value) -> Result<Self, BoxError> {
        let status = match config.get("status") {
            None | Some(Value::Null) => StatusCode::OK,
            Some(value) => {
                let code = value
                    .as_u64()
                    .and_then(|c| u16::try_from(c).ok())
                    .ok_or("'status' must be an integer")?;
                StatusCode::from_u16(code).map_err(|_| format!("invalid status code {code}"))?
            }
        };
        let body = Bytes::copy_from_slice(str_field(config, "body")?.unwrap_or_default().as_bytes());
        let content_type = str_field(config, "content_type")?.unwrap_or("text/plain; charset=utf-8");
        let content_type = HeaderValue::from_str(content_type)
            .map_err(|e| format!("invalid content_type: {e}"))?;

        Ok(Self {
            status,
            body,
            content_type,
        })
    }
}

impl Plugin for StaticResponse {
    fn on_request<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        _next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, self.content_type.clone());
        exchange.respond(response);
        Box::pin(async { Ok(()) })
    }
}

pub fn register(registry: &Registry<Arc<dyn Plugin>>) {
    registry.register(
        FactoryInfo::new("static", "Answers requests with a fixed response instead of forwarding")
            .param(Param::optional("status", "integer", "Status code", "200"))
            .param(Param::optional("body", "string", "Response body", "maintenance"))
            .param(Param::optional(
                "content_type",
                "string",
                "Content-Type header",
                "text/plain",
            )),
        |config: &Value| Ok(Arc::new(StaticResponse::from_config(config)?) as Arc<dyn Plugin>),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let plugin = StaticResponse::from_config(&Value::Null).unwrap();
        assert_eq!(plugin.status, StatusCode::OK);
        assert!(plugin.body.is_empty());
    }

    #[test]
    fn test_invalid_status() {
        assert!(StaticResponse::from_config(&json!({ "status": 42 })).is_err());
        assert!(StaticResponse::from_config(&json!({ "status": "teapot" })).is_err());
        let plugin = StaticResponse::from_config(&json!({ "status": 503, "body": "down" })).unwrap();
        assert_eq!(plugin.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
