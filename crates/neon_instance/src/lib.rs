//! The instance runtime: top-level lifecycle, signal loop and hot
//! reload.
//!
//! An [`Instance`] initializes the store, the fetcher, the loader and
//! the server in that order, registers the server (handing over any
//! sockets inherited across a hot reload), starts everything and then
//! blocks on the signal loop. SIGINT/SIGTERM stop the instance, SIGQUIT
//! shuts it down gracefully, SIGHUP hands the listening sockets to a
//! freshly spawned successor process.

pub mod reload;
pub mod spawn;

use core::time::Duration;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use tokio::net::UnixListener;
use tokio::signal::unix::{SignalKind, signal};

use neon_config::Config;
use neon_core::mediator::{FetchMediator, StoreMediator};
use neon_core::registry::ModuleRegistry;
use neon_fetcher::{Fetcher, FetcherError};
use neon_loader::{Loader, LoaderError};
use neon_server::{InheritedListeners, Server, ServerError};
use neon_store::{Store, StoreError};

use crate::reload::{CHILD_ENV, ChildSession, ReloadError};

/// Environment variable enabling debug logging and panic stacks.
pub const DEBUG_ENV: &str = "DEBUG";

/// Graceful shutdown budget.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Reload handshake budget.
pub const RELOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Error raised by the instance runtime.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    /// The configuration check failed; one line per problem.
    #[error("configuration check failed:\n{}", .0.join("\n"))]
    Check(Vec<String>),

    /// The store failed to initialize.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The fetcher failed to initialize.
    #[error(transparent)]
    Fetcher(#[from] FetcherError),

    /// The loader failed to initialize.
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// The server failed.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The reload handshake failed.
    #[error(transparent)]
    Reload(#[from] ReloadError),

    /// An I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle states of the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstanceState {
    /// Constructed, nothing initialized.
    #[default]
    Created,
    /// The configuration passed `check`.
    Checked,
    /// Subsystems are running and the signal loop is active.
    Serving,
    /// An immediate stop is in progress.
    Stopping,
    /// A graceful shutdown is in progress.
    ShuttingDown,
    /// A hot reload is in progress.
    Reloading,
    /// The lifecycle has resolved.
    Terminated,
}

/// The top-level runtime tying every subsystem together.
pub struct Instance {
    config: Config,
    registry: Arc<ModuleRegistry>,
    debug: bool,
    state: InstanceState,
    store: Option<Arc<Store>>,
    fetcher: Option<Arc<Fetcher>>,
    loader: Option<Loader>,
    server: Option<Server>,
}

impl Instance {
    /// Creates an instance over a decoded configuration and a populated
    /// module registry. Debug behavior follows the `DEBUG` environment
    /// variable.
    #[must_use]
    pub fn new(config: Config, registry: Arc<ModuleRegistry>) -> Self {
        Self {
            config,
            registry,
            debug: std::env::var_os(DEBUG_ENV).is_some(),
            state: InstanceState::Created,
            store: None,
            fetcher: None,
            loader: None,
            server: None,
        }
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Validates the whole configuration, accumulating every problem so
    /// a single run reports all of them.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Check`] carrying the aggregated report.
    pub fn check(&mut self) -> Result<(), InstanceError> {
        let mut report = Vec::new();
        report.extend(Store::check(&self.config.store, &self.registry));
        report.extend(Fetcher::check(&self.config.fetcher, &self.registry));
        report.extend(Loader::check(&self.config.loader, &self.registry));
        report.extend(Server::check(&self.config.server, &self.registry));
        if !report.is_empty() {
            return Err(InstanceError::Check(report));
        }
        self.state = InstanceState::Checked;
        Ok(())
    }

    /// Runs the instance until a terminating signal resolves it.
    ///
    /// In the child role (the `CHILD` environment variable is set) the
    /// reload handshake is completed first to recover the inherited
    /// listener sockets.
    ///
    /// # Errors
    ///
    /// Returns the first init, register or start failure; signal-driven
    /// stops resolve to `Ok`.
    pub async fn serve(&mut self) -> Result<(), InstanceError> {
        let inherited = match std::env::var(CHILD_ENV) {
            Ok(secret) => self.child_handshake(&secret).await?,
            Err(_) => InheritedListeners::new(),
        };

        if let Err(err) = self.registry.load() {
            tracing::warn!(error = %err, "module registry load");
        }
        self.init_subsystems()?;

        let server = self.server.as_mut().expect("server initialized above");
        server.register(inherited)?;
        server.start().await?;
        self.state = InstanceState::Serving;
        tracing::info!("instance serving");

        self.signal_loop().await?;
        self.state = InstanceState::Terminated;
        if let Err(err) = self.registry.unload() {
            tracing::warn!(error = %err, "module registry unload");
        }
        tracing::info!("instance terminated");
        Ok(())
    }

    /// Store → Fetcher → Loader → Server, in that order.
    fn init_subsystems(&mut self) -> Result<(), InstanceError> {
        let store = Arc::new(Store::init(&self.config.store, &self.registry)?);
        let fetcher = Arc::new(Fetcher::init(&self.config.fetcher, &self.registry)?);

        let mut loader = Loader::init(&self.config.loader, &self.registry)?;
        loader.start(
            Arc::clone(&store) as Arc<dyn StoreMediator>,
            Arc::clone(&fetcher) as Arc<dyn FetchMediator>,
        );

        let server = Server::init(
            &self.config.server,
            &self.registry,
            Arc::clone(&store) as Arc<dyn StoreMediator>,
            Arc::clone(&fetcher) as Arc<dyn FetchMediator>,
            self.debug,
        )?;

        self.store = Some(store);
        self.fetcher = Some(fetcher);
        self.loader = Some(loader);
        self.server = Some(server);
        Ok(())
    }

    async fn child_handshake(&self, secret: &str) -> Result<InheritedListeners, InstanceError> {
        let path = reload::socket_path();
        tracing::info!(socket = %path.display(), "child role: recovering inherited sockets");
        let mut session = ChildSession::connect(&path).await?;
        let payload = session.negotiate(secret).await?;
        // SAFETY: we are the freshly spawned child; the parent placed the
        // declared sockets at fd 3 and up.
        let inherited = unsafe { reload::recover_listeners(&payload)? };
        session.confirm().await?;
        Ok(inherited)
    }

    /// Blocks until the first terminating signal resolves the run. A
    /// failed shutdown or reload leaves the loop running so the operator
    /// can issue another signal.
    async fn signal_loop(&mut self) -> Result<(), InstanceError> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigquit = signal(SignalKind::quit())?;
        let mut sighup = signal(SignalKind::hangup())?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("SIGINT received, stopping");
                    self.stop().await;
                    return Ok(());
                }
                _ = sigterm.recv() => {
                    tracing::info!("SIGTERM received, stopping");
                    self.stop().await;
                    return Ok(());
                }
                _ = sigquit.recv() => {
                    tracing::info!("SIGQUIT received, shutting down");
                    match self.shutdown(SHUTDOWN_TIMEOUT).await {
                        Ok(()) => return Ok(()),
                        Err(err) => tracing::error!(error = %err, "shutdown failed"),
                    }
                }
                _ = sighup.recv() => {
                    tracing::info!("SIGHUP received, reloading");
                    match self.reload().await {
                        Ok(()) => return Ok(()),
                        Err(err) => {
                            tracing::error!(error = %err, "reload failed, still serving");
                            self.state = InstanceState::Serving;
                        }
                    }
                }
            }
        }
    }

    /// Stops the instance immediately. Component failures are logged;
    /// a signal-driven stop still resolves cleanly.
    pub async fn stop(&mut self) {
        self.state = InstanceState::Stopping;
        if let Some(server) = self.server.as_mut() {
            server.stop().await;
        }
        if let Some(loader) = self.loader.as_mut() {
            loader.stop().await;
        }
        tracing::info!("instance stopped");
    }

    /// Gracefully shuts the instance down within `timeout`.
    ///
    /// # Errors
    ///
    /// Propagates the first component shutdown failure.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<(), InstanceError> {
        self.state = InstanceState::ShuttingDown;
        if let Some(server) = self.server.as_mut() {
            server.shutdown(timeout).await?;
        }
        if let Some(loader) = self.loader.as_mut() {
            loader.stop().await;
        }
        tracing::info!("instance shut down");
        Ok(())
    }

    /// Hot reload: spawns a successor with the listening sockets
    /// inherited, awaits its handshake, then gracefully shuts this
    /// instance down. On failure the instance keeps serving on the same
    /// sockets.
    ///
    /// # Errors
    ///
    /// Returns a [`ReloadError`]-carrying failure when the spawn or the
    /// handshake fails; the instance is then still serving.
    pub async fn reload(&mut self) -> Result<(), InstanceError> {
        self.state = InstanceState::Reloading;

        let server = self
            .server
            .as_ref()
            .ok_or(ReloadError::Protocol("server not running".to_string()))?;

        let secret = generate_secret();
        let path = reload::socket_path();
        let _ = std::fs::remove_file(&path);
        let socket = UnixListener::bind(&path)?;

        let handoff = spawn::prepare_handoff(&server.listeners()?)?;
        let child = spawn::spawn_child(&secret, &handoff)?;
        tracing::info!(pid = child.id(), "successor spawned");

        let handshake = tokio::time::timeout(
            RELOAD_TIMEOUT,
            reload::serve_handshake(&socket, &secret, &handoff.payload),
        )
        .await;
        let _ = std::fs::remove_file(&path);

        match handshake {
            Ok(Ok(())) => {
                self.shutdown(SHUTDOWN_TIMEOUT).await?;
                Ok(())
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(ReloadError::Timeout.into()),
        }
    }
}

impl core::fmt::Debug for Instance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Instance")
            .field("state", &self.state)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// A fresh 16-byte cryptographically random secret, base64-encoded.
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}
