//! Per-category module contracts.
//!
//! Each pluggable category has one trait. A module is created unconfigured
//! by its registry factory, then `init` receives the module's configuration
//! map exactly as it appeared in the config file (unknown keys included).

use core::time::Duration;
use std::net::TcpListener;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, ModuleError, ResourceError};
use crate::http::HttpHandler;
use crate::mediator::{FetchMediator, SiteMediator, StoreMediator};
use crate::resource::Resource;

/// Storage backend behind the store facade.
///
/// The facade imposes no locking; concurrent `load_resource` and
/// `store_resource` calls must be safe as guaranteed by the module.
#[async_trait]
pub trait StorageModule: Send + Sync {
    /// Applies the module configuration.
    fn init(&mut self, config: Value) -> Result<(), ModuleError>;

    /// Returns the most recently stored resource under `name`.
    async fn load_resource(&self, name: &str) -> Result<Resource, ResourceError>;

    /// Stores `resource` under `name`, replacing any previous record.
    async fn store_resource(&self, name: &str, resource: Resource) -> Result<(), ResourceError>;
}

/// A fetcher provider pulling resources from some origin.
#[async_trait]
pub trait FetcherProviderModule: Send + Sync {
    /// Applies the provider-level configuration.
    fn init(&mut self, config: Value) -> Result<(), ModuleError>;

    /// Fetches one resource; `config` is the per-fetch configuration passed
    /// by the caller (a loader rule or a handler).
    async fn fetch(
        &self,
        ctx: &CancellationToken,
        name: &str,
        config: &Value,
    ) -> Result<Resource, FetchError>;
}

/// A loader parser: one scheduled unit of ingestion work.
#[async_trait]
pub trait ParserModule: Send + Sync {
    /// Applies the rule configuration.
    fn init(&mut self, config: Value) -> Result<(), ModuleError>;

    /// Executes the rule once, pulling data through `fetch` and placing
    /// resources into `store`. Implementations should observe `ctx` at
    /// their await points.
    async fn parse(
        &self,
        ctx: &CancellationToken,
        store: &dyn StoreMediator,
        fetch: &dyn FetchMediator,
    ) -> Result<(), ModuleError>;
}

/// A network listener owning the accept sockets for one server listener.
#[async_trait]
pub trait ListenerModule: Send + Sync {
    /// Applies the module configuration. The module must not bind sockets
    /// here.
    fn init(&mut self, config: Value) -> Result<(), ModuleError>;

    /// Hands the module already-open listening sockets inherited across a
    /// hot reload. With an empty set the module binds its own sockets when
    /// `serve` starts.
    fn register(&mut self, inherited: Vec<TcpListener>) -> Result<(), ModuleError>;

    /// Accepts connections and dispatches every request to `handler`.
    /// Blocks until the listener is shut down or closed.
    async fn serve(&self, handler: Arc<dyn HttpHandler>) -> Result<(), ModuleError>;

    /// Stops accepting and drains in-flight requests, waiting at most
    /// `timeout`.
    async fn shutdown(&self, timeout: Duration) -> Result<(), ModuleError>;

    /// Tears down the accept loop immediately.
    fn close(&self) -> Result<(), ModuleError>;

    /// Duplicates the live listening sockets, in stable order, for handoff
    /// to a successor process.
    fn listeners(&self) -> std::io::Result<Vec<TcpListener>>;
}

/// An HTTP middleware module.
///
/// During `register` the module hands its wrapper to the site through
/// [`SiteMediator::register_middleware`]; it may keep the mediator for
/// runtime store or fetcher access.
#[async_trait]
pub trait MiddlewareModule: Send + Sync {
    /// Applies the module configuration.
    fn init(&mut self, config: Value) -> Result<(), ModuleError>;

    /// Registers the middleware with the owning site.
    fn register(&mut self, site: Arc<dyn SiteMediator>) -> Result<(), ModuleError>;

    /// Site start notification.
    async fn start(&self) -> Result<(), ModuleError>;

    /// Site stop notification.
    async fn stop(&self) -> Result<(), ModuleError>;
}

/// A terminal HTTP handler module.
#[async_trait]
pub trait HandlerModule: Send + Sync {
    /// Applies the module configuration.
    fn init(&mut self, config: Value) -> Result<(), ModuleError>;

    /// Registers the handler with the owning site.
    fn register(&mut self, site: Arc<dyn SiteMediator>) -> Result<(), ModuleError>;

    /// Site start notification.
    async fn start(&self) -> Result<(), ModuleError>;

    /// Site stop notification.
    async fn stop(&self) -> Result<(), ModuleError>;
}
