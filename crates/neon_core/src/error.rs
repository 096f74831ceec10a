//! Error types shared across the core contracts.

use crate::module::{ModuleId, ModuleKind};

/// Boxed error used to carry backend-specific failures across a contract
/// boundary without the contract naming the backend's error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error raised by a module while being configured or operated.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// The module configuration is malformed.
    #[error("invalid module config: {0}")]
    Config(String),

    /// The module failed to initialize.
    #[error("module init failed: {0}")]
    Init(String),

    /// An I/O failure inside the module.
    #[error("module io: {0}")]
    Io(#[from] std::io::Error),

    /// Any other module failure.
    #[error(transparent)]
    Other(#[from] BoxError),
}

impl ModuleError {
    /// Wraps an arbitrary error as a module failure.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(err))
    }
}

/// Error raised when reading or writing a resource.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// No resource is stored under the requested name.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The storage backend failed.
    #[error("storage backend: {0}")]
    Backend(#[source] BoxError),
}

/// Error raised while fetching a resource from a provider.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The named provider is not configured.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// The per-fetch configuration is malformed.
    #[error("invalid fetch config: {0}")]
    Config(String),

    /// The provider request failed.
    #[error("provider request failed: {0}")]
    Provider(#[source] BoxError),
}

/// Error raised by the module registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No module is registered under the given id.
    #[error("module not found: {0}")]
    NotFound(ModuleId),

    /// A module with the same id was registered before.
    #[error("module already registered: {0}")]
    AlreadyRegistered(ModuleId),

    /// The module exists but belongs to another category.
    #[error("module '{id}' is not a {expected} module")]
    WrongKind {
        /// The looked-up module id.
        id: ModuleId,
        /// The category the caller asked for.
        expected: ModuleKind,
    },

    /// `load()` was called twice for the same instance life.
    #[error("module registry is already loaded")]
    AlreadyLoaded,

    /// `unload()` was called without a preceding `load()`.
    #[error("module registry is not loaded")]
    NotLoaded,
}
