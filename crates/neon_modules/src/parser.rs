//! Pass-through loader parser (`app.loader.parser.raw`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use neon_core::contract::ParserModule;
use neon_core::error::ModuleError;
use neon_core::mediator::{FetchMediator, StoreMediator};

#[derive(Debug, Clone, Deserialize)]
struct RawResourceConfig {
    name: String,
    provider: String,
    #[serde(default)]
    config: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct RawParserConfig {
    resource: RawResourceConfig,
}

/// Fetches one named resource and stores it verbatim.
#[derive(Default)]
pub struct RawParser {
    config: Option<RawParserConfig>,
}

#[async_trait]
impl ParserModule for RawParser {
    fn init(&mut self, config: Value) -> Result<(), ModuleError> {
        let config: RawParserConfig =
            serde_json::from_value(config).map_err(|err| ModuleError::Config(err.to_string()))?;
        self.config = Some(config);
        Ok(())
    }

    async fn parse(
        &self,
        ctx: &CancellationToken,
        store: &dyn StoreMediator,
        fetch: &dyn FetchMediator,
    ) -> Result<(), ModuleError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| ModuleError::Config("parser not initialized".to_string()))?;
        let resource = &config.resource;

        let fetched = fetch
            .fetch(ctx, &resource.name, &resource.provider, &resource.config)
            .await
            .map_err(ModuleError::other)?;
        store
            .store_resource(&resource.name, fetched)
            .await
            .map_err(ModuleError::other)?;
        tracing::debug!(resource = resource.name, "raw resource refreshed");
        Ok(())
    }
}
