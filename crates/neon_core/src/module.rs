//! Module identity and factories.
//!
//! Every pluggable unit is addressed by a dotted [`ModuleId`] such as
//! `app.server.listener.tcp`. The last segment is the *kind* a
//! configuration file refers to; the prefix is fixed per category and
//! encoded in [`ModuleKind`].

use core::fmt;

use crate::contract::{
    FetcherProviderModule, HandlerModule, ListenerModule, MiddlewareModule, ParserModule,
    StorageModule,
};

/// A dotted module identifier, unique process-wide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    /// Creates an id from a dotted name.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ModuleKind
// ─────────────────────────────────────────────────────────────────────────────

/// The category a module belongs to.
///
/// Each category owns a fixed id namespace; configuration files name
/// modules by their short kind (`memory`, `tcp`, ...) and the consuming
/// subsystem resolves the full id via [`ModuleKind::id_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// Storage backend behind the store facade.
    Storage,
    /// Fetcher provider pulling resources from an origin.
    FetcherProvider,
    /// Loader parser driving fetches into the store.
    Parser,
    /// Network listener owning accept sockets.
    Listener,
    /// HTTP middleware wrapping a terminal handler.
    Middleware,
    /// Terminal HTTP handler.
    Handler,
}

impl ModuleKind {
    /// The dotted id prefix owned by this category.
    #[must_use]
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::Storage => "app.store.storage",
            Self::FetcherProvider => "app.fetcher.provider",
            Self::Parser => "app.loader.parser",
            Self::Listener => "app.server.listener",
            Self::Middleware => "app.server.middleware",
            Self::Handler => "app.server.handler",
        }
    }

    /// Resolves a configuration kind name to a full module id.
    #[must_use]
    pub fn id_for(self, kind: &str) -> ModuleId {
        ModuleId::new(format!("{}.{kind}", self.namespace()))
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Storage => "storage",
            Self::FetcherProvider => "fetcher provider",
            Self::Parser => "parser",
            Self::Listener => "listener",
            Self::Middleware => "middleware",
            Self::Handler => "handler",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ModuleInfo / ModuleInstance
// ─────────────────────────────────────────────────────────────────────────────

/// A fresh, unconfigured module produced by a factory.
///
/// The enum keeps registry lookups strongly typed: a consumer asks for the
/// category it needs and a mismatched id surfaces as
/// [`RegistryError::WrongKind`](crate::error::RegistryError::WrongKind)
/// instead of a downcast failure.
pub enum ModuleInstance {
    /// A storage backend.
    Storage(Box<dyn StorageModule>),
    /// A fetcher provider.
    FetcherProvider(Box<dyn FetcherProviderModule>),
    /// A loader parser.
    Parser(Box<dyn ParserModule>),
    /// A network listener.
    Listener(Box<dyn ListenerModule>),
    /// An HTTP middleware.
    Middleware(Box<dyn MiddlewareModule>),
    /// A terminal HTTP handler.
    Handler(Box<dyn HandlerModule>),
}

impl ModuleInstance {
    /// The category of the instance.
    #[must_use]
    pub fn kind(&self) -> ModuleKind {
        match self {
            Self::Storage(_) => ModuleKind::Storage,
            Self::FetcherProvider(_) => ModuleKind::FetcherProvider,
            Self::Parser(_) => ModuleKind::Parser,
            Self::Listener(_) => ModuleKind::Listener,
            Self::Middleware(_) => ModuleKind::Middleware,
            Self::Handler(_) => ModuleKind::Handler,
        }
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModuleInstance").field(&self.kind()).finish()
    }
}

/// Error raised when a `{<kind>: <config>}` selection map does not name
/// exactly one module kind.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    /// The selection map is empty.
    #[error("no module selected")]
    Empty,

    /// The selection map names more than one kind.
    #[error("multiple modules selected: {}", .0.join(", "))]
    Multiple(Vec<String>),
}

/// Selects the single module kind from a `{<kind>: <config>}` map.
///
/// Configuration shapes such as `{storage: {memory: {...}}}` select a
/// module by mapping its kind to its config. A selection naming several
/// kinds is rejected outright rather than resolved first-wins.
///
/// # Errors
///
/// [`SelectionError::Empty`] or [`SelectionError::Multiple`].
pub fn select_kind(
    selection: &serde_json::Map<String, serde_json::Value>,
) -> Result<(&str, &serde_json::Value), SelectionError> {
    let mut entries = selection.iter();
    let Some((kind, config)) = entries.next() else {
        return Err(SelectionError::Empty);
    };
    if entries.len() > 0 {
        return Err(SelectionError::Multiple(
            selection.keys().cloned().collect(),
        ));
    }
    Ok((kind.as_str(), config))
}

/// Factory producing a fresh module instance.
///
/// Factories must be deterministic and cheap; they carry no configuration.
pub type ModuleFactory = std::sync::Arc<dyn Fn() -> ModuleInstance + Send + Sync>;

/// Registry entry describing one pluggable module.
#[derive(Clone)]
pub struct ModuleInfo {
    id: ModuleId,
    kind: ModuleKind,
    new: ModuleFactory,
}

impl ModuleInfo {
    /// Creates a registry entry.
    #[must_use]
    pub fn new(
        id: impl Into<ModuleId>,
        kind: ModuleKind,
        new: impl Fn() -> ModuleInstance + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            new: std::sync::Arc::new(new),
        }
    }

    /// The module id.
    #[must_use]
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// The module category.
    #[must_use]
    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Produces a fresh, unconfigured instance.
    #[must_use]
    pub fn instantiate(&self) -> ModuleInstance {
        (self.new)()
    }
}

impl fmt::Debug for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInfo")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
