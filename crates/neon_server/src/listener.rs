//! A server listener: one listener module plus the composite router over
//! every linked site.

use core::time::Duration;
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use http::header::HOST;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use neon_core::contract::ListenerModule;
use neon_core::http::{HttpHandler, HttpRequest, HttpResponse, status_response};
use neon_core::module::{ModuleKind, select_kind};
use neon_core::registry::ModuleRegistry;

use crate::error::ServerError;
use crate::router::{Mux, strip_port};
use crate::site::ServerSite;

/// A link/unlink notification sent to the update loop; the loop answers
/// on `ack` once the composite router has been swapped.
struct UpdateRequest {
    ack: oneshot::Sender<Result<(), ServerError>>,
}

/// State shared between the listener, its update loop and the handler
/// facade in front of the composite router.
struct ListenerShared {
    name: String,
    sites: RwLock<HashMap<String, Arc<ServerSite>>>,
    router: RwLock<Option<Arc<Mux>>>,
}

impl ListenerShared {
    /// Rebuilds the composite router from every linked site and swaps it
    /// in. Requests already dispatched keep the previous router.
    fn rebuild(&self) -> Result<(), ServerError> {
        let sites = self.sites.read();
        let mut tables = Vec::with_capacity(sites.len());
        for site in sites.values() {
            let table = site.router().ok_or_else(|| ServerError::RouterRebuild(format!(
                "site '{}' has no router",
                site.name()
            )))?;
            tables.push(table);
        }
        let mux = Mux::merge(tables.iter().map(Arc::as_ref));
        tracing::debug!(
            listener = self.name,
            sites = sites.len(),
            entries = mux.len(),
            "listener router rebuilt"
        );
        *self.router.write() = Some(Arc::new(mux));
        Ok(())
    }
}

/// Owner of one listener module and the routing of inbound requests to
/// all linked sites.
pub struct ServerListener {
    name: String,
    module: Box<dyn ListenerModule>,
    shared: Arc<ListenerShared>,
    update_tx: mpsc::Sender<UpdateRequest>,
    update_rx: Mutex<Option<mpsc::Receiver<UpdateRequest>>>,
    remove: CancellationToken,
}

impl ServerListener {
    /// Validates a listener configuration, one report line per problem.
    #[must_use]
    pub fn check(name: &str, config: &Map<String, Value>, registry: &ModuleRegistry) -> Vec<String> {
        match select_kind(config) {
            Ok((kind, _)) => {
                if registry.has_kind(ModuleKind::Listener, kind) {
                    Vec::new()
                } else {
                    vec![format!(
                        "listener '{name}': unknown module '{}'",
                        ModuleKind::Listener.id_for(kind)
                    )]
                }
            }
            Err(err) => vec![format!("listener '{name}': {err}")],
        }
    }

    /// Selects, creates and initializes the backing listener module. The
    /// module is not yet bound to a socket.
    ///
    /// # Errors
    ///
    /// Returns a [`ServerError`] on a bad selection, an unknown module or
    /// an init failure.
    pub fn new(
        name: impl Into<String>,
        config: &Map<String, Value>,
        registry: &ModuleRegistry,
    ) -> Result<Self, ServerError> {
        let name = name.into();
        let (kind, module_config) = select_kind(config).map_err(|err| ServerError::Listener {
            name: name.clone(),
            reason: err.to_string(),
        })?;
        let mut module = registry.create_listener(kind)?;
        module.init(module_config.clone())?;

        let (update_tx, update_rx) = mpsc::channel(8);
        Ok(Self {
            shared: Arc::new(ListenerShared {
                name: name.clone(),
                sites: RwLock::new(HashMap::new()),
                router: RwLock::new(None),
            }),
            name,
            module,
            update_tx,
            update_rx: Mutex::new(Some(update_rx)),
            remove: CancellationToken::new(),
        })
    }

    /// The listener name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hands inherited sockets to the module (if any) and starts the
    /// update loop that rebuilds the composite router on link/unlink.
    ///
    /// # Errors
    ///
    /// Propagates module registration failures.
    pub fn register(&mut self, inherited: Vec<TcpListener>) -> Result<(), ServerError> {
        if !inherited.is_empty() {
            tracing::info!(
                listener = self.name,
                sockets = inherited.len(),
                "listener adopting inherited sockets"
            );
        }
        self.module.register(inherited)?;

        let Some(mut update_rx) = self.update_rx.lock().take() else {
            return Err(ServerError::Listener {
                name: self.name.clone(),
                reason: "already registered".to_string(),
            });
        };
        let shared = Arc::clone(&self.shared);
        let remove = self.remove.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = update_rx.recv() => {
                        let Some(UpdateRequest { ack }) = request else { break };
                        let _ = ack.send(shared.rebuild());
                    }
                    () = remove.cancelled() => break,
                }
            }
            tracing::debug!(listener = shared.name, "listener update loop exited");
        });
        Ok(())
    }

    /// Links a site and waits for the router rebuild to be acknowledged.
    ///
    /// # Errors
    ///
    /// Rebuild failures surface here; the site-set mutation stays in place
    /// and the caller treats the failure as fatal for site start.
    pub async fn link(&self, site: Arc<ServerSite>) -> Result<(), ServerError> {
        {
            let mut sites = self.shared.sites.write();
            sites.insert(site.name().to_string(), site);
        }
        self.request_update().await
    }

    /// Unlinks a site and waits for the router rebuild to be acknowledged.
    ///
    /// # Errors
    ///
    /// Rebuild failures surface here.
    pub async fn unlink(&self, site: &ServerSite) -> Result<(), ServerError> {
        {
            let mut sites = self.shared.sites.write();
            sites.remove(site.name());
        }
        self.request_update().await
    }

    async fn request_update(&self) -> Result<(), ServerError> {
        let (ack, done) = oneshot::channel();
        self.update_tx
            .send(UpdateRequest { ack })
            .await
            .map_err(|_| ServerError::UpdateLoopClosed)?;
        done.await.map_err(|_| ServerError::UpdateLoopClosed)?
    }

    /// The handler facade placed in front of the composite router.
    #[must_use]
    pub fn handler(&self) -> Arc<dyn HttpHandler> {
        Arc::new(ListenerHandler {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Blocks serving connections through the module.
    ///
    /// # Errors
    ///
    /// Propagates the module's serve failure.
    pub async fn serve(&self) -> Result<(), ServerError> {
        tracing::info!(listener = self.name, "listener serving");
        self.module.serve(self.handler()).await?;
        Ok(())
    }

    /// Gracefully drains in-flight requests, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Propagates the module's shutdown failure.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ServerError> {
        self.module.shutdown(timeout).await?;
        Ok(())
    }

    /// Tears down the accept loop immediately.
    ///
    /// # Errors
    ///
    /// Propagates the module's close failure.
    pub fn close(&self) -> Result<(), ServerError> {
        self.module.close()?;
        Ok(())
    }

    /// Unblocks and ends the update loop.
    pub fn remove(&self) {
        self.remove.cancel();
    }

    /// Duplicates the live listening sockets for the hot-reload handoff.
    ///
    /// # Errors
    ///
    /// Propagates socket duplication failures.
    pub fn listeners(&self) -> std::io::Result<Vec<TcpListener>> {
        self.module.listeners()
    }
}

impl core::fmt::Debug for ServerListener {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServerListener")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Facade answering 503 until the first composite router is built.
struct ListenerHandler {
    shared: Arc<ListenerShared>,
}

#[async_trait]
impl HttpHandler for ListenerHandler {
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let mux = self.shared.router.read().clone();
        let Some(mux) = mux else {
            return status_response(StatusCode::SERVICE_UNAVAILABLE);
        };

        let host = request
            .headers()
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| request.uri().host())
            .map(strip_port)
            .unwrap_or_default()
            .to_string();
        let path = request.uri().path().to_string();

        match mux.lookup(&host, &path) {
            Some(handler) => handler.handle(request).await,
            None => status_response(StatusCode::NOT_FOUND),
        }
    }
}
