//! Core contracts for the neon site server.
//!
//! This crate defines the pieces every other neon crate builds on:
//!
//! - [`resource::Resource`]: the cacheable payload moved between fetcher
//!   providers, the store, and request handlers.
//! - [`module`] / [`registry`]: the process-wide catalogue of pluggable
//!   modules and the strongly typed factories that produce them.
//! - [`contract`]: the per-category module traits (storage, fetcher
//!   provider, parser, listener, middleware, handler).
//! - [`mediator`]: the narrow callback interfaces modules use to reach
//!   back into the core without holding the core directly.
//! - [`http`]: the handler/middleware composition types shared by the
//!   server and every HTTP-facing module.
//!
//! The crate carries no runtime of its own; subsystems (`neon_store`,
//! `neon_server`, ...) consume these contracts.

pub mod contract;
pub mod error;
pub mod http;
pub mod mediator;
pub mod module;
pub mod registry;
pub mod resource;

pub use contract::{
    FetcherProviderModule, HandlerModule, ListenerModule, MiddlewareModule, ParserModule,
    StorageModule,
};
pub use error::{FetchError, ModuleError, RegistryError, ResourceError};
pub use http::{HttpHandler, HttpMiddleware, HttpRequest, HttpResponse};
pub use mediator::{FetchMediator, MediatorError, SiteMediator, StoreMediator};
pub use module::{ModuleId, ModuleInfo, ModuleInstance, ModuleKind, SelectionError, select_kind};
pub use registry::ModuleRegistry;
pub use resource::Resource;
