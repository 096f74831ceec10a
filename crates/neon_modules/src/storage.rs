//! In-memory storage module (`app.store.storage.memory`).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use neon_core::contract::StorageModule;
use neon_core::error::{ModuleError, ResourceError};
use neon_core::resource::Resource;

/// Keeps resources in a process-local map. Replacing a name replaces the
/// whole record; reads return the most recently stored value.
#[derive(Default)]
pub struct MemoryStorage {
    resources: RwLock<HashMap<String, Resource>>,
}

#[async_trait]
impl StorageModule for MemoryStorage {
    fn init(&mut self, _config: Value) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn load_resource(&self, name: &str) -> Result<Resource, ResourceError> {
        self.resources
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))
    }

    async fn store_resource(&self, name: &str, resource: Resource) -> Result<(), ResourceError> {
        self.resources.write().insert(name.to_string(), resource);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[tokio::test]
    async fn replaces_whole_record_on_store() {
        let storage = MemoryStorage::default();
        let first = Resource::new("feed", Duration::from_secs(10)).with_chunk("one");
        let second = Resource::new("feed", Duration::from_secs(10)).with_chunk("two");

        storage.store_resource("feed", first).await.unwrap();
        storage.store_resource("feed", second.clone()).await.unwrap();

        assert_eq!(storage.load_resource("feed").await.unwrap(), second);
    }

    #[tokio::test]
    async fn missing_name_is_not_found() {
        let storage = MemoryStorage::default();
        assert!(matches!(
            storage.load_resource("absent").await,
            Err(ResourceError::NotFound(_))
        ));
    }
}
