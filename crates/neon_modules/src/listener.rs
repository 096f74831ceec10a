//! TCP listener module (`app.server.listener.tcp`).
//!
//! Serves http/1 connections off one or more TCP sockets. The sockets
//! are either bound from configuration when `serve` starts, or adopted
//! from the inherited set handed over across a hot reload.

use core::convert::Infallible;
use core::time::Duration;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use neon_core::contract::ListenerModule;
use neon_core::error::ModuleError;
use neon_core::http::{HttpHandler, RequestBody};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct TcpConfig {
    address: String,
    port: u16,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

struct TcpShared {
    close: CancellationToken,
    graceful: Mutex<Option<GracefulShutdown>>,
    sockets: Mutex<Vec<std::net::TcpListener>>,
}

/// One TCP accept surface feeding every request to the listener's
/// handler facade.
pub struct TcpListenerModule {
    config: TcpConfig,
    shared: Arc<TcpShared>,
}

impl Default for TcpListenerModule {
    fn default() -> Self {
        Self {
            config: TcpConfig::default(),
            shared: Arc::new(TcpShared {
                close: CancellationToken::new(),
                graceful: Mutex::new(None),
                sockets: Mutex::new(Vec::new()),
            }),
        }
    }
}

#[async_trait]
impl ListenerModule for TcpListenerModule {
    fn init(&mut self, config: Value) -> Result<(), ModuleError> {
        self.config = match config {
            Value::Null => TcpConfig::default(),
            other => serde_json::from_value(other)
                .map_err(|err| ModuleError::Config(err.to_string()))?,
        };
        Ok(())
    }

    fn register(&mut self, inherited: Vec<std::net::TcpListener>) -> Result<(), ModuleError> {
        if !inherited.is_empty() {
            *self.shared.sockets.lock() = inherited;
        }
        Ok(())
    }

    async fn serve(&self, handler: Arc<dyn HttpHandler>) -> Result<(), ModuleError> {
        let accept_sockets = {
            let mut sockets = self.shared.sockets.lock();
            if sockets.is_empty() {
                let address = format!("{}:{}", self.config.address, self.config.port);
                let socket = std::net::TcpListener::bind(&address)?;
                tracing::info!(address = %socket.local_addr()?, "tcp listener bound");
                sockets.push(socket);
            }
            sockets
                .iter()
                .map(std::net::TcpListener::try_clone)
                .collect::<std::io::Result<Vec<_>>>()?
        };
        self.shared
            .graceful
            .lock()
            .get_or_insert_with(GracefulShutdown::new);

        let mut accept_tasks = Vec::with_capacity(accept_sockets.len());
        for socket in accept_sockets {
            socket.set_nonblocking(true)?;
            let listener = tokio::net::TcpListener::from_std(socket)?;
            let shared = Arc::clone(&self.shared);
            let handler = Arc::clone(&handler);
            accept_tasks.push(tokio::spawn(accept_loop(listener, shared, handler)));
        }
        for task in accept_tasks {
            let _ = task.await;
        }
        Ok(())
    }

    async fn shutdown(&self, timeout: Duration) -> Result<(), ModuleError> {
        self.shared.close.cancel();
        let graceful = self.shared.graceful.lock().take();
        if let Some(graceful) = graceful {
            if tokio::time::timeout(timeout, graceful.shutdown())
                .await
                .is_err()
            {
                tracing::warn!("graceful drain did not finish in time");
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<(), ModuleError> {
        self.shared.close.cancel();
        Ok(())
    }

    fn listeners(&self) -> std::io::Result<Vec<std::net::TcpListener>> {
        self.shared
            .sockets
            .lock()
            .iter()
            .map(std::net::TcpListener::try_clone)
            .collect()
    }
}

async fn accept_loop(
    listener: tokio::net::TcpListener,
    shared: Arc<TcpShared>,
    handler: Arc<dyn HttpHandler>,
) {
    loop {
        let stream = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _remote)) => stream,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    continue;
                }
            },
            () = shared.close.cancelled() => break,
        };

        let handler = Arc::clone(&handler);
        let service = service_fn(move |request: Request<Incoming>| {
            let handler = Arc::clone(&handler);
            async move {
                let (parts, body) = request.into_parts();
                let request = Request::from_parts(parts, RequestBody::from(body));
                Ok::<_, Infallible>(handler.handle(request).await)
            }
        });

        let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
        let watched = shared
            .graceful
            .lock()
            .as_ref()
            .map(|graceful| graceful.watch(connection));
        if let Some(connection) = watched {
            tokio::spawn(async move {
                if let Err(err) = connection.await {
                    tracing::debug!(error = %err, "connection ended with error");
                }
            });
        }
    }
    tracing::debug!("accept loop closed");
}
