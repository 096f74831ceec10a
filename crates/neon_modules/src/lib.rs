//! Built-in module set for neon.
//!
//! | Module id | Role |
//! |---|---|
//! | `app.store.storage.memory` | In-memory resource storage |
//! | `app.fetcher.provider.rest` | HTTP GET fetcher provider |
//! | `app.loader.parser.raw` | Fetch-and-store loader parser |
//! | `app.server.listener.tcp` | TCP + http/1 listener |
//! | `app.server.middleware.logger` | Per-request log line |
//! | `app.server.handler.text` | Fixed status/body handler |

pub mod handler;
pub mod listener;
pub mod middleware;
pub mod parser;
pub mod provider;
pub mod storage;

pub use handler::TextHandlerModule;
pub use listener::TcpListenerModule;
pub use middleware::LoggerMiddlewareModule;
pub use parser::RawParser;
pub use provider::RestProvider;
pub use storage::MemoryStorage;

use neon_core::error::RegistryError;
use neon_core::module::{ModuleInfo, ModuleInstance, ModuleKind};
use neon_core::registry::ModuleRegistry;

/// Registers every built-in module into `registry`.
///
/// # Errors
///
/// Returns [`RegistryError::AlreadyRegistered`] when called twice on the
/// same registry.
pub fn register_builtin_modules(registry: &ModuleRegistry) -> Result<(), RegistryError> {
    registry.register(ModuleInfo::new(
        ModuleKind::Storage.id_for("memory"),
        ModuleKind::Storage,
        || ModuleInstance::Storage(Box::new(MemoryStorage::default())),
    ))?;
    registry.register(ModuleInfo::new(
        ModuleKind::FetcherProvider.id_for("rest"),
        ModuleKind::FetcherProvider,
        || ModuleInstance::FetcherProvider(Box::new(RestProvider::default())),
    ))?;
    registry.register(ModuleInfo::new(
        ModuleKind::Parser.id_for("raw"),
        ModuleKind::Parser,
        || ModuleInstance::Parser(Box::new(RawParser::default())),
    ))?;
    registry.register(ModuleInfo::new(
        ModuleKind::Listener.id_for("tcp"),
        ModuleKind::Listener,
        || ModuleInstance::Listener(Box::new(TcpListenerModule::default())),
    ))?;
    registry.register(ModuleInfo::new(
        ModuleKind::Middleware.id_for("logger"),
        ModuleKind::Middleware,
        || ModuleInstance::Middleware(Box::new(LoggerMiddlewareModule)),
    ))?;
    registry.register(ModuleInfo::new(
        ModuleKind::Handler.id_for("text"),
        ModuleKind::Handler,
        || ModuleInstance::Handler(Box::new(TextHandlerModule::default())),
    ))?;
    Ok(())
}
