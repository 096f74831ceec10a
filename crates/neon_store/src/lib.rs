//! The resource store facade.
//!
//! [`Store`] is a thin delegating facade over the one storage module
//! selected by configuration. It imposes no locking policy of its own;
//! concurrent reads and writes are safe as guaranteed by the backing
//! module.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use neon_core::contract::StorageModule;
use neon_core::error::{ModuleError, RegistryError, ResourceError};
use neon_core::mediator::StoreMediator;
use neon_core::module::{ModuleKind, select_kind};
use neon_core::registry::ModuleRegistry;
use neon_core::resource::Resource;

/// Error raised while configuring the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The `storage` key is missing or does not select exactly one module.
    #[error("storage selection: {0}")]
    Selection(String),

    /// The selected module could not be created.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The selected module failed to initialize.
    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// Thin facade over the configured storage module.
pub struct Store {
    module: Box<dyn StorageModule>,
}

impl Store {
    /// Validates the store configuration without instantiating anything
    /// heavier than a registry lookup. Returns one report line per
    /// problem so a single check surfaces every error.
    #[must_use]
    pub fn check(config: &Map<String, Value>, registry: &ModuleRegistry) -> Vec<String> {
        let mut report = Vec::new();
        match storage_selection(config) {
            Ok((kind, _)) => {
                if !registry.has_kind(ModuleKind::Storage, kind) {
                    report.push(format!(
                        "store: unknown storage module '{}'",
                        ModuleKind::Storage.id_for(kind)
                    ));
                }
            }
            Err(reason) => report.push(format!("store: {reason}")),
        }
        report
    }

    /// Selects, creates and initializes the configured storage module.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on a bad selection, an unknown module or
    /// an init failure from the module itself.
    pub fn init(config: &Map<String, Value>, registry: &ModuleRegistry) -> Result<Self, StoreError> {
        let (kind, module_config) = storage_selection(config).map_err(StoreError::Selection)?;
        let mut module = registry.create_storage(kind)?;
        module.init(module_config.clone())?;
        tracing::debug!(module = %ModuleKind::Storage.id_for(kind), "store initialized");
        Ok(Self { module })
    }

    /// Returns the most recently stored resource under `name`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotFound`] when nothing is stored under the name;
    /// backend failures propagate verbatim.
    pub async fn load_resource(&self, name: &str) -> Result<Resource, ResourceError> {
        self.module.load_resource(name).await
    }

    /// Stores `resource` under `name`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Backend failures propagate verbatim.
    pub async fn store_resource(&self, name: &str, resource: Resource) -> Result<(), ResourceError> {
        self.module.store_resource(name, resource).await
    }
}

impl core::fmt::Debug for Store {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreMediator for Store {
    async fn load_resource(&self, name: &str) -> Result<Resource, ResourceError> {
        Store::load_resource(self, name).await
    }

    async fn store_resource(&self, name: &str, resource: Resource) -> Result<(), ResourceError> {
        Store::store_resource(self, name, resource).await
    }
}

/// Mediator handle over a shared store.
pub type SharedStore = Arc<Store>;

fn storage_selection(config: &Map<String, Value>) -> Result<(&str, &Value), String> {
    let Some(storage) = config.get("storage") else {
        return Err("missing 'storage' section".to_string());
    };
    let Value::Object(selection) = storage else {
        return Err("'storage' must be a mapping".to_string());
    };
    select_kind(selection).map_err(|err| err.to_string())
}
