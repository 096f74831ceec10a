//! The server orchestrator: listeners, sites and the binding graph.

use core::time::Duration;
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Arc;

use serde_json::{Map, Value};

use neon_core::mediator::{FetchMediator, StoreMediator};
use neon_core::registry::ModuleRegistry;

use crate::error::ServerError;
use crate::listener::ServerListener;
use crate::site::ServerSite;

/// Inherited sockets recovered from a hot reload, keyed by listener name.
pub type InheritedListeners = HashMap<String, Vec<TcpListener>>;

/// Orchestrates all listeners and sites and owns the binding graph
/// between them.
pub struct Server {
    sites: HashMap<String, Arc<ServerSite>>,
    pending_listeners: HashMap<String, ServerListener>,
    listeners: HashMap<String, Arc<ServerListener>>,
    bindings: HashMap<String, Vec<Arc<ServerListener>>>,
    serve_tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Server {
    /// Validates the whole server tree, one report line per problem.
    #[must_use]
    pub fn check(config: &Map<String, Value>, registry: &ModuleRegistry) -> Vec<String> {
        let mut report = Vec::new();

        let listeners = match mapping_entries(config, "listeners") {
            Ok(entries) => entries,
            Err(reason) => {
                report.push(format!("server: {reason}"));
                Vec::new()
            }
        };
        if listeners.is_empty() {
            report.push("server: at least one listener is required".to_string());
        }
        for (name, listener_config) in &listeners {
            report.extend(ServerListener::check(name, listener_config, registry));
        }

        let sites = match mapping_entries(config, "sites") {
            Ok(entries) => entries,
            Err(reason) => {
                report.push(format!("server: {reason}"));
                Vec::new()
            }
        };
        if sites.is_empty() {
            report.push("server: at least one site is required".to_string());
        }

        let listener_names: Vec<&String> = listeners.iter().map(|(name, _)| name).collect();
        let mut default_sites = Vec::new();
        for (name, site_config) in &sites {
            report.extend(ServerSite::check(name, site_config, registry));

            for referenced in site_listener_names(site_config) {
                if !listener_names.iter().any(|known| **known == referenced) {
                    report.push(format!(
                        "site '{name}': unknown listener '{referenced}'"
                    ));
                }
            }
            if site_hosts(site_config).is_empty() {
                default_sites.push(name.clone());
            }
        }
        if default_sites.len() > 1 {
            report.push(format!(
                "server: at most one default site is allowed, found: {}",
                default_sites.join(", ")
            ));
        }

        report
    }

    /// Validates the tree and creates every listener and site.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] with the aggregated report when
    /// validation fails, or the first creation failure.
    pub fn init(
        config: &Map<String, Value>,
        registry: &Arc<ModuleRegistry>,
        store: Arc<dyn StoreMediator>,
        fetch: Arc<dyn FetchMediator>,
        debug: bool,
    ) -> Result<Self, ServerError> {
        let report = Self::check(config, registry);
        if !report.is_empty() {
            return Err(ServerError::Config(report.join("; ")));
        }

        let mut pending_listeners = HashMap::new();
        for (name, listener_config) in
            mapping_entries(config, "listeners").map_err(ServerError::Config)?
        {
            let listener = ServerListener::new(name.clone(), &listener_config, registry)?;
            pending_listeners.insert(name, listener);
        }

        let mut sites = HashMap::new();
        for (name, site_config) in mapping_entries(config, "sites").map_err(ServerError::Config)? {
            let site = ServerSite::new(
                name.clone(),
                &site_config,
                Arc::clone(registry),
                Arc::clone(&store),
                Arc::clone(&fetch),
                debug,
            )?;
            sites.insert(name, Arc::new(site));
        }

        Ok(Self {
            sites,
            pending_listeners,
            listeners: HashMap::new(),
            bindings: HashMap::new(),
            serve_tasks: Vec::new(),
        })
    }

    /// Registers every listener (handing over any inherited sockets) and
    /// every site. The inherited socket set is consumed here, exactly
    /// once.
    ///
    /// # Errors
    ///
    /// The first listener or site registration failure aborts.
    pub fn register(&mut self, mut inherited: InheritedListeners) -> Result<(), ServerError> {
        let pending = std::mem::take(&mut self.pending_listeners);
        for (name, mut listener) in pending {
            let sockets = inherited.remove(&name).unwrap_or_default();
            listener.register(sockets)?;
            self.listeners.insert(name, Arc::new(listener));
        }

        for site in self.sites.values() {
            site.register()?;
        }
        Ok(())
    }

    /// Links every site to each listener it references, starts every
    /// site, then begins serving on every listener. Linking first
    /// guarantees each listener's composite router already includes all
    /// sites before any request is accepted.
    ///
    /// # Errors
    ///
    /// The first link or site start failure aborts.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        for site in self.sites.values() {
            let mut bound = Vec::new();
            for listener_name in site.listener_names() {
                let listener =
                    self.listeners
                        .get(listener_name)
                        .ok_or_else(|| ServerError::Site {
                            name: site.name().to_string(),
                            reason: format!("unknown listener '{listener_name}'"),
                        })?;
                listener.link(Arc::clone(site)).await?;
                bound.push(Arc::clone(listener));
            }
            self.bindings.insert(site.name().to_string(), bound);
        }

        for site in self.sites.values() {
            site.start().await?;
        }

        for listener in self.listeners.values() {
            let listener = Arc::clone(listener);
            self.serve_tasks.push(tokio::spawn(async move {
                if let Err(err) = listener.serve().await {
                    tracing::error!(listener = listener.name(), error = %err, "serve failed");
                }
            }));
        }
        Ok(())
    }

    /// Closes every listener immediately, then stops every site.
    /// Failures are logged, never propagated.
    pub async fn stop(&mut self) {
        for listener in self.listeners.values() {
            if let Err(err) = listener.close() {
                tracing::warn!(listener = listener.name(), error = %err, "close failed");
            }
        }
        for site in self.sites.values() {
            site.stop().await;
        }
        for listener in self.listeners.values() {
            listener.remove();
        }
        self.reap_serve_tasks().await;
    }

    /// Graceful shutdown: drain listeners, unlink every site, close and
    /// remove listeners, stop sites.
    ///
    /// # Errors
    ///
    /// The first drain or unlink failure aborts.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<(), ServerError> {
        for listener in self.listeners.values() {
            listener.shutdown(timeout).await?;
        }

        for site in self.sites.values() {
            if let Some(bound) = self.bindings.get(site.name()) {
                for listener in bound {
                    listener.unlink(site).await?;
                }
            }
        }

        for listener in self.listeners.values() {
            if let Err(err) = listener.close() {
                tracing::warn!(listener = listener.name(), error = %err, "close failed");
            }
            listener.remove();
        }

        for site in self.sites.values() {
            site.stop().await;
        }

        self.reap_serve_tasks().await;
        Ok(())
    }

    /// Duplicates every listener's live sockets for the hot-reload fd
    /// handoff, keyed by listener name.
    ///
    /// # Errors
    ///
    /// Propagates socket duplication failures.
    pub fn listeners(&self) -> std::io::Result<InheritedListeners> {
        let mut map = InheritedListeners::new();
        for (name, listener) in &self.listeners {
            map.insert(name.clone(), listener.listeners()?);
        }
        Ok(map)
    }

    /// Looks up a registered listener by name.
    #[must_use]
    pub fn listener(&self, name: &str) -> Option<Arc<ServerListener>> {
        self.listeners.get(name).cloned()
    }

    /// Looks up a site by name.
    #[must_use]
    pub fn site(&self, name: &str) -> Option<Arc<ServerSite>> {
        self.sites.get(name).cloned()
    }

    async fn reap_serve_tasks(&mut self) {
        for mut task in self.serve_tasks.drain(..) {
            if tokio::time::timeout(Duration::from_secs(1), &mut task)
                .await
                .is_err()
            {
                tracing::warn!("serve task did not finish in time, aborting");
                task.abort();
            }
        }
    }
}

impl core::fmt::Debug for Server {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Server")
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .field("sites", &self.sites.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Decodes `config[key]` as a map of named mapping entries.
fn mapping_entries(
    config: &Map<String, Value>,
    key: &str,
) -> Result<Vec<(String, Map<String, Value>)>, String> {
    let Some(section) = config.get(key) else {
        return Ok(Vec::new());
    };
    let Value::Object(section) = section else {
        return Err(format!("'{key}' must be a mapping"));
    };
    let mut entries = Vec::new();
    for (name, value) in section {
        let Value::Object(value) = value else {
            return Err(format!("'{key}' entry '{name}' must be a mapping"));
        };
        entries.push((name.clone(), value.clone()));
    }
    Ok(entries)
}

fn site_listener_names(site_config: &Map<String, Value>) -> Vec<String> {
    match site_config.get("listeners") {
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(|name| name.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn site_hosts(site_config: &Map<String, Value>) -> Vec<String> {
    match site_config.get("hosts") {
        Some(Value::Array(hosts)) => hosts
            .iter()
            .filter_map(|host| host.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
