//! Request logging middleware (`app.server.middleware.logger`).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use neon_core::contract::MiddlewareModule;
use neon_core::error::ModuleError;
use neon_core::http::{HttpHandler, HttpMiddleware, HttpRequest, handler_fn};
use neon_core::mediator::SiteMediator;

struct LoggerMiddleware {
    site: String,
}

impl HttpMiddleware for LoggerMiddleware {
    fn wrap(&self, next: Arc<dyn HttpHandler>) -> Arc<dyn HttpHandler> {
        let site = self.site.clone();
        handler_fn(move |request: HttpRequest| {
            let next = Arc::clone(&next);
            let site = site.clone();
            async move {
                let method = request.method().clone();
                let path = request.uri().path().to_string();
                let started = Instant::now();
                let response = next.handle(request).await;
                tracing::info!(
                    site,
                    %method,
                    path,
                    status = response.status().as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request"
                );
                response
            }
        })
    }
}

/// Logs one line per request with method, path, status and latency.
#[derive(Default)]
pub struct LoggerMiddlewareModule;

#[async_trait]
impl MiddlewareModule for LoggerMiddlewareModule {
    fn init(&mut self, _config: Value) -> Result<(), ModuleError> {
        Ok(())
    }

    fn register(&mut self, site: Arc<dyn SiteMediator>) -> Result<(), ModuleError> {
        site.register_middleware(Arc::new(LoggerMiddleware { site: site.name() }))
            .map_err(ModuleError::other)
    }

    async fn start(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }
}
