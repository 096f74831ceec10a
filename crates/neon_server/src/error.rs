//! Server error types.

use neon_core::error::{ModuleError, RegistryError};
use neon_core::mediator::MediatorError;

/// Error raised by the server, its listeners or its sites.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The server configuration is invalid.
    #[error("server config: {0}")]
    Config(String),

    /// A listener-scoped failure.
    #[error("listener '{name}': {reason}")]
    Listener {
        /// The listener name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// A site-scoped failure.
    #[error("site '{name}': {reason}")]
    Site {
        /// The site name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// A module could not be created.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A module failed.
    #[error(transparent)]
    Module(#[from] ModuleError),

    /// A mediator registration was rejected.
    #[error(transparent)]
    Mediator(#[from] MediatorError),

    /// The listener's composite router could not be rebuilt.
    #[error("failed to rebuild router: {0}")]
    RouterRebuild(String),

    /// The listener update loop has exited.
    #[error("listener update loop is gone")]
    UpdateLoopClosed,

    /// An I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
