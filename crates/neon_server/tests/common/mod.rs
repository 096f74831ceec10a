//! Stub modules and helpers shared by the server integration tests.

#![allow(dead_code)]

use core::time::Duration;
use std::net::TcpListener;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use neon_core::contract::{HandlerModule, ListenerModule, MiddlewareModule};
use neon_core::error::{FetchError, ModuleError, ResourceError};
use neon_core::http::{
    HttpHandler, HttpMiddleware, HttpRequest, HttpResponse, full_body, handler_fn, status_response,
};
use neon_core::mediator::{FetchMediator, SiteMediator, StoreMediator};
use neon_core::module::{ModuleInfo, ModuleInstance, ModuleKind};
use neon_core::registry::ModuleRegistry;
use neon_core::resource::Resource;

pub struct NullStore;

#[async_trait]
impl StoreMediator for NullStore {
    async fn load_resource(&self, name: &str) -> Result<Resource, ResourceError> {
        Err(ResourceError::NotFound(name.to_string()))
    }

    async fn store_resource(&self, _name: &str, _resource: Resource) -> Result<(), ResourceError> {
        Ok(())
    }
}

pub struct NullFetch;

#[async_trait]
impl FetchMediator for NullFetch {
    async fn fetch(
        &self,
        _ctx: &CancellationToken,
        _name: &str,
        provider: &str,
        _config: &Value,
    ) -> Result<Resource, FetchError> {
        Err(FetchError::ProviderNotFound(provider.to_string()))
    }
}

/// A listener module that never touches a socket; tests drive the
/// listener's handler facade directly.
#[derive(Default)]
pub struct StubListenerModule {
    stop: CancellationToken,
}

#[async_trait]
impl ListenerModule for StubListenerModule {
    fn init(&mut self, _config: Value) -> Result<(), ModuleError> {
        Ok(())
    }

    fn register(&mut self, _inherited: Vec<TcpListener>) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn serve(&self, _handler: Arc<dyn HttpHandler>) -> Result<(), ModuleError> {
        self.stop.cancelled().await;
        Ok(())
    }

    async fn shutdown(&self, _timeout: Duration) -> Result<(), ModuleError> {
        self.stop.cancel();
        Ok(())
    }

    fn close(&self) -> Result<(), ModuleError> {
        self.stop.cancel();
        Ok(())
    }

    fn listeners(&self) -> std::io::Result<Vec<TcpListener>> {
        Ok(Vec::new())
    }
}

/// Serves a fixed body configured under `body`.
#[derive(Default)]
pub struct BodyHandlerModule {
    body: String,
}

#[async_trait]
impl HandlerModule for BodyHandlerModule {
    fn init(&mut self, config: Value) -> Result<(), ModuleError> {
        self.body = config
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(())
    }

    fn register(&mut self, site: Arc<dyn SiteMediator>) -> Result<(), ModuleError> {
        let body = self.body.clone();
        site.register_handler(handler_fn(move |_request: HttpRequest| {
            let body = body.clone();
            async move {
                let mut response: HttpResponse = status_response(StatusCode::OK);
                *response.body_mut() = full_body(body);
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

/// Panics on every request; used to exercise envelope recovery.
#[derive(Default)]
pub struct PanicHandlerModule;

#[async_trait]
impl HandlerModule for PanicHandlerModule {
    fn init(&mut self, _config: Value) -> Result<(), ModuleError> {
        Ok(())
    }

    fn register(&mut self, site: Arc<dyn SiteMediator>) -> Result<(), ModuleError> {
        site.register_handler(handler_fn(|_request: HttpRequest| async move {
            panic!("stub handler panic")
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

struct TagMiddleware {
    tag: String,
}

impl HttpMiddleware for TagMiddleware {
    fn wrap(&self, next: Arc<dyn HttpHandler>) -> Arc<dyn HttpHandler> {
        let tag = self.tag.clone();
        handler_fn(move |request: HttpRequest| {
            let next = Arc::clone(&next);
            let tag = tag.clone();
            async move {
                let mut response = next.handle(request).await;
                response.headers_mut().append(
                    "x-chain",
                    http::HeaderValue::from_str(&tag).expect("ascii tag"),
                );
                response
            }
        })
    }
}

/// Appends its configured `tag` to the `x-chain` response header.
#[derive(Default)]
pub struct TagMiddlewareModule {
    tag: String,
}

#[async_trait]
impl MiddlewareModule for TagMiddlewareModule {
    fn init(&mut self, config: Value) -> Result<(), ModuleError> {
        self.tag = config
            .get("tag")
            .and_then(Value::as_str)
            .unwrap_or("tag")
            .to_string();
        Ok(())
    }

    fn register(&mut self, site: Arc<dyn SiteMediator>) -> Result<(), ModuleError> {
        site.register_middleware(Arc::new(TagMiddleware {
            tag: self.tag.clone(),
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

/// A registry holding every stub module used by these tests.
pub fn registry() -> Arc<ModuleRegistry> {
    let registry = ModuleRegistry::new();
    registry
        .register(ModuleInfo::new(
            ModuleKind::Listener.id_for("stub"),
            ModuleKind::Listener,
            || ModuleInstance::Listener(Box::new(StubListenerModule::default())),
        ))
        .unwrap();
    registry
        .register(ModuleInfo::new(
            ModuleKind::Handler.id_for("body"),
            ModuleKind::Handler,
            || ModuleInstance::Handler(Box::new(BodyHandlerModule::default())),
        ))
        .unwrap();
    registry
        .register(ModuleInfo::new(
            ModuleKind::Handler.id_for("panic"),
            ModuleKind::Handler,
            || ModuleInstance::Handler(Box::new(PanicHandlerModule)),
        ))
        .unwrap();
    registry
        .register(ModuleInfo::new(
            ModuleKind::Middleware.id_for("tag"),
            ModuleKind::Middleware,
            || ModuleInstance::Middleware(Box::new(TagMiddlewareModule::default())),
        ))
        .unwrap();
    Arc::new(registry)
}

/// Decodes a JSON object literal into a section map.
pub fn section(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Builds a GET request against the given host and path.
pub fn request(host: &str, path: &str) -> HttpRequest {
    http::Request::builder()
        .uri(path)
        .header(http::header::HOST, host)
        .body(neon_core::http::RequestBody::Empty)
        .unwrap()
}

/// Collects a response body to a string.
pub async fn body_string(response: HttpResponse) -> String {
    use http_body_util::BodyExt;
    let collected = response.into_body().collect().await.expect("body");
    String::from_utf8(collected.to_bytes().to_vec()).expect("utf8 body")
}
