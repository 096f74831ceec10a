//! Mediator interfaces between the core and plugin modules.
//!
//! Modules never hold the store, the fetcher, or a site directly. At
//! register time they receive narrow callback objects — mediators — whose
//! surface is the whole plugin API. Mediators are thin, lock-protected
//! facades and carry no logic of their own.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, ResourceError};
use crate::http::{HttpHandler, HttpMiddleware};
use crate::resource::Resource;

/// Read/write access to the shared resource store.
#[async_trait]
pub trait StoreMediator: Send + Sync {
    /// Loads the most recently stored resource under `name`.
    async fn load_resource(&self, name: &str) -> Result<Resource, ResourceError>;

    /// Stores `resource` under `name`, replacing any previous record.
    async fn store_resource(&self, name: &str, resource: Resource) -> Result<(), ResourceError>;
}

/// Access to the provider-dispatching fetcher.
#[async_trait]
pub trait FetchMediator: Send + Sync {
    /// Fetches `name` through the named provider with the given per-fetch
    /// configuration.
    async fn fetch(
        &self,
        ctx: &CancellationToken,
        name: &str,
        provider: &str,
        config: &Value,
    ) -> Result<Resource, FetchError>;
}

/// Error raised by a site mediator registration callback.
#[derive(Debug, thiserror::Error)]
pub enum MediatorError {
    /// Registration was attempted outside the site's register phase.
    #[error("registration is only allowed while the site is registering")]
    NotRegistering,

    /// The route being registered already has a terminal handler.
    #[error("route '{0}' already has a handler")]
    HandlerAlreadyRegistered(String),
}

/// Callback surface a site passes to its middleware and handler modules.
///
/// Registration callbacks are valid only during the site's register phase;
/// outside it they return [`MediatorError::NotRegistering`].
pub trait SiteMediator: Send + Sync {
    /// The site name.
    fn name(&self) -> String;

    /// The listener names the site is bound to.
    fn listeners(&self) -> Vec<String>;

    /// The host names the site answers for; empty for the default site.
    fn hosts(&self) -> Vec<String>;

    /// The shared store.
    fn store(&self) -> Arc<dyn StoreMediator>;

    /// The shared fetcher.
    fn fetch(&self) -> Arc<dyn FetchMediator>;

    /// Registers a middleware for the route currently being registered.
    fn register_middleware(&self, middleware: Arc<dyn HttpMiddleware>) -> Result<(), MediatorError>;

    /// Registers the terminal handler for the route currently being
    /// registered.
    fn register_handler(&self, handler: Arc<dyn HttpHandler>) -> Result<(), MediatorError>;
}
