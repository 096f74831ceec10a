//! Fixed-body handler (`app.server.handler.text`).

use std::sync::Arc;

use async_trait::async_trait;
use http::{Response, StatusCode, header};
use serde::Deserialize;
use serde_json::Value;

use neon_core::contract::HandlerModule;
use neon_core::error::ModuleError;
use neon_core::http::{HttpRequest, full_body, handler_fn};
use neon_core::mediator::SiteMediator;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct TextConfig {
    status: u16,
    body: String,
    content_type: String,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            content_type: "text/plain; charset=utf-8".to_string(),
        }
    }
}

/// Answers every request with a configured status and body.
#[derive(Default)]
pub struct TextHandlerModule {
    config: TextConfig,
}

#[async_trait]
impl HandlerModule for TextHandlerModule {
    fn init(&mut self, config: Value) -> Result<(), ModuleError> {
        self.config = match config {
            Value::Null => TextConfig::default(),
            other => serde_json::from_value(other)
                .map_err(|err| ModuleError::Config(err.to_string()))?,
        };
        StatusCode::from_u16(self.config.status)
            .map_err(|err| ModuleError::Config(err.to_string()))?;
        Ok(())
    }

    fn register(&mut self, site: Arc<dyn SiteMediator>) -> Result<(), ModuleError> {
        let config = self.config.clone();
        let status = StatusCode::from_u16(config.status)
            .map_err(|err| ModuleError::Config(err.to_string()))?;
        let content_type = header::HeaderValue::from_str(&config.content_type)
            .map_err(|err| ModuleError::Config(err.to_string()))?;

        site.register_handler(handler_fn(move |_request: HttpRequest| {
            let body = config.body.clone();
            let content_type = content_type.clone();
            async move {
                let mut response = Response::new(full_body(body));
                *response.status_mut() = status;
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, content_type);
                response
            }
        }))
        .map_err(ModuleError::other)
    }

    async fn start(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }
}
