//! A pluggable HTTP site server with hot reload and background resource
//! ingestion.
//!
//! The crates compose bottom-up: [`neon_core`] defines the resource
//! model, the module registry and the plugin contracts; [`neon_store`],
//! [`neon_fetcher`] and [`neon_loader`] move resources; [`neon_server`]
//! hosts the virtual sites; [`neon_instance`] ties it all into a
//! signal-driven lifecycle with zero-downtime reload. [`neon_modules`]
//! ships the built-in module set.

use std::sync::Arc;

/// Configuration loading.
pub use neon_config;
/// Core contracts: resources, registry, mediators.
pub use neon_core;
/// The provider-dispatching fetcher.
pub use neon_fetcher;
/// The instance runtime.
pub use neon_instance;
/// The loader scheduler.
pub use neon_loader;
/// The built-in module set.
pub use neon_modules;
/// Listener and site orchestration.
pub use neon_server;
/// The resource store facade.
pub use neon_store;

use neon_core::error::RegistryError;
use neon_core::registry::ModuleRegistry;

/// A registry populated with every built-in module.
///
/// # Errors
///
/// Propagates duplicate registrations, which cannot happen on a fresh
/// registry.
pub fn default_registry() -> Result<Arc<ModuleRegistry>, RegistryError> {
    let registry = ModuleRegistry::new();
    neon_modules::register_builtin_modules(&registry)?;
    Ok(Arc::new(registry))
}

/// Re-export of the most commonly used types.
pub mod prelude {
    pub use neon_config::Config;
    pub use neon_core::registry::ModuleRegistry;
    pub use neon_core::resource::Resource;
    pub use neon_instance::{Instance, InstanceError, InstanceState};

    pub use crate::default_registry;
}
