//! The provider-dispatching fetcher.
//!
//! [`Fetcher`] routes `(name, provider)` pulls to one of many configured
//! provider modules. It adds no caching; it is a dispatcher. A read-lock
//! guards the provider table so fetches are reentrant; the table is only
//! written during init.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use neon_core::contract::FetcherProviderModule;
use neon_core::error::{FetchError, ModuleError, RegistryError};
use neon_core::mediator::FetchMediator;
use neon_core::module::{ModuleKind, select_kind};
use neon_core::registry::ModuleRegistry;
use neon_core::resource::Resource;

/// Error raised while configuring the fetcher.
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// A provider entry does not select exactly one module.
    #[error("provider '{provider}': {reason}")]
    Selection {
        /// The provider entry name.
        provider: String,
        /// Why the selection failed.
        reason: String,
    },

    /// A provider module could not be created.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A provider module failed to initialize.
    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// Routes named pulls to configured provider modules.
pub struct Fetcher {
    providers: RwLock<HashMap<String, Arc<dyn FetcherProviderModule>>>,
}

impl Fetcher {
    /// Validates the fetcher configuration, one report line per problem.
    #[must_use]
    pub fn check(config: &Map<String, Value>, registry: &ModuleRegistry) -> Vec<String> {
        let mut report = Vec::new();
        for (provider, selection) in provider_entries(config) {
            match selection {
                Ok((kind, _)) => {
                    if !registry.has_kind(ModuleKind::FetcherProvider, kind) {
                        report.push(format!(
                            "fetcher: provider '{provider}': unknown module '{}'",
                            ModuleKind::FetcherProvider.id_for(kind)
                        ));
                    }
                }
                Err(reason) => report.push(format!("fetcher: provider '{provider}': {reason}")),
            }
        }
        report
    }

    /// Creates and initializes every configured provider module.
    ///
    /// An empty `providers` section yields a fetcher that fails every
    /// fetch with [`FetchError::ProviderNotFound`].
    ///
    /// # Errors
    ///
    /// Returns a [`FetcherError`] on a bad selection, an unknown module or
    /// an init failure.
    pub fn init(config: &Map<String, Value>, registry: &ModuleRegistry) -> Result<Self, FetcherError> {
        let mut providers: HashMap<String, Arc<dyn FetcherProviderModule>> = HashMap::new();
        for (provider, selection) in provider_entries(config) {
            let (kind, module_config) = selection.map_err(|reason| FetcherError::Selection {
                provider: provider.clone(),
                reason,
            })?;
            let mut module = registry.create_fetcher_provider(kind)?;
            module.init(module_config.clone())?;
            tracing::debug!(
                provider,
                module = %ModuleKind::FetcherProvider.id_for(kind),
                "fetcher provider initialized"
            );
            providers.insert(provider, Arc::from(module));
        }
        Ok(Self {
            providers: RwLock::new(providers),
        })
    }

    /// Fetches `name` through the named provider.
    ///
    /// # Errors
    ///
    /// [`FetchError::ProviderNotFound`] for an unconfigured provider name;
    /// provider failures propagate verbatim.
    pub async fn fetch(
        &self,
        ctx: &CancellationToken,
        name: &str,
        provider: &str,
        config: &Value,
    ) -> Result<Resource, FetchError> {
        let module = self
            .providers
            .read()
            .get(provider)
            .cloned()
            .ok_or_else(|| FetchError::ProviderNotFound(provider.to_string()))?;
        module.fetch(ctx, name, config).await
    }

    /// The configured provider names.
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }
}

impl core::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Fetcher")
            .field("providers", &self.provider_names())
            .finish()
    }
}

#[async_trait]
impl FetchMediator for Fetcher {
    async fn fetch(
        &self,
        ctx: &CancellationToken,
        name: &str,
        provider: &str,
        config: &Value,
    ) -> Result<Resource, FetchError> {
        Fetcher::fetch(self, ctx, name, provider, config).await
    }
}

/// Iterates `{providers: {<name>: {<kind>: <cfg>}}}` entries, resolving
/// each entry's selection or the reason it is invalid.
fn provider_entries(
    config: &Map<String, Value>,
) -> impl Iterator<Item = (String, Result<(&str, &Value), String>)> {
    let entries = match config.get("providers") {
        Some(Value::Object(providers)) => providers.iter().collect::<Vec<_>>(),
        _ => Vec::new(),
    };
    entries.into_iter().map(|(provider, selection)| {
        let resolved = match selection {
            Value::Object(map) => select_kind(map).map_err(|err| err.to_string()),
            _ => Err("provider entry must be a mapping".to_string()),
        };
        (provider.clone(), resolved)
    })
}
