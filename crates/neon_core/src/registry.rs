//! The process-wide module registry.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::contract::{
    FetcherProviderModule, HandlerModule, ListenerModule, MiddlewareModule, ParserModule,
    StorageModule,
};
use crate::error::RegistryError;
use crate::module::{ModuleId, ModuleInfo, ModuleInstance, ModuleKind};

/// Ordered catalogue mapping module ids to factories.
///
/// A registry is an explicit value constructed at process start; tests
/// build isolated registries instead of sharing a process-wide static.
/// `lookup` is safe for concurrent use once the catalogue is populated.
///
/// ```
/// use neon_core::module::{ModuleInfo, ModuleInstance, ModuleKind};
/// use neon_core::registry::ModuleRegistry;
/// # fn factory() -> ModuleInstance { unimplemented!() }
///
/// let registry = ModuleRegistry::new();
/// registry
///     .register(ModuleInfo::new(
///         "app.store.storage.memory",
///         ModuleKind::Storage,
///         factory,
///     ))
///     .unwrap();
/// assert!(registry.lookup(&"app.store.storage.memory".into()).is_ok());
/// ```
#[derive(Default)]
pub struct ModuleRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    order: Vec<ModuleId>,
    infos: HashMap<ModuleId, ModuleInfo>,
    loaded: bool,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] when the id is taken.
    pub fn register(&self, info: ModuleInfo) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let id = info.id().clone();
        if inner.infos.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        inner.order.push(id.clone());
        inner.infos.insert(id, info);
        Ok(())
    }

    /// Looks up a module by id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown id.
    pub fn lookup(&self, id: &ModuleId) -> Result<ModuleInfo, RegistryError> {
        self.inner
            .read()
            .infos
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Returns true when a module with the given id is registered.
    #[must_use]
    pub fn exists(&self, id: &ModuleId) -> bool {
        self.inner.read().infos.contains_key(id)
    }

    /// Registered ids in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<ModuleId> {
        self.inner.read().order.clone()
    }

    /// Marks the catalogue as loaded for this instance life.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyLoaded`] on a second call.
    pub fn load(&self) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        if inner.loaded {
            return Err(RegistryError::AlreadyLoaded);
        }
        inner.loaded = true;
        tracing::debug!(modules = inner.order.len(), "module registry loaded");
        Ok(())
    }

    /// Releases the catalogue at the end of the instance life.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotLoaded`] without a preceding `load`.
    pub fn unload(&self) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        if !inner.loaded {
            return Err(RegistryError::NotLoaded);
        }
        inner.loaded = false;
        Ok(())
    }

    fn create(&self, kind: ModuleKind, name: &str) -> Result<ModuleInstance, RegistryError> {
        let id = kind.id_for(name);
        let info = self.lookup(&id)?;
        if info.kind() != kind {
            return Err(RegistryError::WrongKind { id, expected: kind });
        }
        let instance = info.instantiate();
        if instance.kind() != kind {
            return Err(RegistryError::WrongKind { id, expected: kind });
        }
        Ok(instance)
    }

    /// Instantiates the storage module registered under the short `kind`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] or [`RegistryError::WrongKind`].
    pub fn create_storage(&self, kind: &str) -> Result<Box<dyn StorageModule>, RegistryError> {
        match self.create(ModuleKind::Storage, kind)? {
            ModuleInstance::Storage(module) => Ok(module),
            _ => Err(RegistryError::WrongKind {
                id: ModuleKind::Storage.id_for(kind),
                expected: ModuleKind::Storage,
            }),
        }
    }

    /// Instantiates a fetcher provider module.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] or [`RegistryError::WrongKind`].
    pub fn create_fetcher_provider(
        &self,
        kind: &str,
    ) -> Result<Box<dyn FetcherProviderModule>, RegistryError> {
        match self.create(ModuleKind::FetcherProvider, kind)? {
            ModuleInstance::FetcherProvider(module) => Ok(module),
            _ => Err(RegistryError::WrongKind {
                id: ModuleKind::FetcherProvider.id_for(kind),
                expected: ModuleKind::FetcherProvider,
            }),
        }
    }

    /// Instantiates a loader parser module.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] or [`RegistryError::WrongKind`].
    pub fn create_parser(&self, kind: &str) -> Result<Box<dyn ParserModule>, RegistryError> {
        match self.create(ModuleKind::Parser, kind)? {
            ModuleInstance::Parser(module) => Ok(module),
            _ => Err(RegistryError::WrongKind {
                id: ModuleKind::Parser.id_for(kind),
                expected: ModuleKind::Parser,
            }),
        }
    }

    /// Instantiates a listener module.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] or [`RegistryError::WrongKind`].
    pub fn create_listener(&self, kind: &str) -> Result<Box<dyn ListenerModule>, RegistryError> {
        match self.create(ModuleKind::Listener, kind)? {
            ModuleInstance::Listener(module) => Ok(module),
            _ => Err(RegistryError::WrongKind {
                id: ModuleKind::Listener.id_for(kind),
                expected: ModuleKind::Listener,
            }),
        }
    }

    /// Instantiates a middleware module.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] or [`RegistryError::WrongKind`].
    pub fn create_middleware(
        &self,
        kind: &str,
    ) -> Result<Box<dyn MiddlewareModule>, RegistryError> {
        match self.create(ModuleKind::Middleware, kind)? {
            ModuleInstance::Middleware(module) => Ok(module),
            _ => Err(RegistryError::WrongKind {
                id: ModuleKind::Middleware.id_for(kind),
                expected: ModuleKind::Middleware,
            }),
        }
    }

    /// Instantiates a handler module.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] or [`RegistryError::WrongKind`].
    pub fn create_handler(&self, kind: &str) -> Result<Box<dyn HandlerModule>, RegistryError> {
        match self.create(ModuleKind::Handler, kind)? {
            ModuleInstance::Handler(module) => Ok(module),
            _ => Err(RegistryError::WrongKind {
                id: ModuleKind::Handler.id_for(kind),
                expected: ModuleKind::Handler,
            }),
        }
    }

    /// Returns true when a module of the given category is registered
    /// under the short `kind`.
    #[must_use]
    pub fn has_kind(&self, kind: ModuleKind, name: &str) -> bool {
        let id = kind.id_for(name);
        self.lookup(&id).is_ok_and(|info| info.kind() == kind)
    }
}

impl core::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::StorageModule;
    use crate::error::{ModuleError, ResourceError};
    use crate::resource::Resource;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NullStorage;

    #[async_trait]
    impl StorageModule for NullStorage {
        fn init(&mut self, _config: Value) -> Result<(), ModuleError> {
            Ok(())
        }

        async fn load_resource(&self, name: &str) -> Result<Resource, ResourceError> {
            Err(ResourceError::NotFound(name.to_string()))
        }

        async fn store_resource(
            &self,
            _name: &str,
            _resource: Resource,
        ) -> Result<(), ResourceError> {
            Ok(())
        }
    }

    fn null_storage() -> ModuleInstance {
        ModuleInstance::Storage(Box::new(NullStorage))
    }

    fn registry_with_null_storage() -> ModuleRegistry {
        let registry = ModuleRegistry::new();
        registry
            .register(ModuleInfo::new(
                ModuleKind::Storage.id_for("null"),
                ModuleKind::Storage,
                null_storage,
            ))
            .unwrap();
        registry
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = registry_with_null_storage();
        let err = registry
            .register(ModuleInfo::new(
                ModuleKind::Storage.id_for("null"),
                ModuleKind::Storage,
                null_storage,
            ))
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));
    }

    #[test]
    fn lookup_unknown_id_reports_not_found() {
        let registry = ModuleRegistry::new();
        let err = registry.lookup(&"app.store.storage.void".into()).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[test]
    fn typed_create_enforces_category() {
        let registry = registry_with_null_storage();
        assert!(registry.create_storage("null").is_ok());
        assert!(matches!(
            registry.create_listener("null"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn load_is_once_per_instance_life() {
        let registry = registry_with_null_storage();
        registry.load().unwrap();
        assert!(matches!(registry.load(), Err(RegistryError::AlreadyLoaded)));
        registry.unload().unwrap();
        registry.load().unwrap();
    }

    #[test]
    fn ids_preserve_registration_order() {
        let registry = registry_with_null_storage();
        registry
            .register(ModuleInfo::new(
                ModuleKind::Storage.id_for("second"),
                ModuleKind::Storage,
                null_storage,
            ))
            .unwrap();
        let ids = registry.ids();
        assert_eq!(ids[0], ModuleKind::Storage.id_for("null"));
        assert_eq!(ids[1], ModuleKind::Storage.id_for("second"));
    }
}
