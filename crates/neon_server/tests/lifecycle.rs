//! Ordering guarantees of server stop and shutdown, pinned with
//! instrumented stub modules.

mod common;

use core::time::Duration;
use std::net::TcpListener;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use neon_core::contract::{HandlerModule, ListenerModule};
use neon_core::error::ModuleError;
use neon_core::http::{HttpHandler, HttpRequest, handler_fn, status_response};
use neon_core::mediator::{MediatorError, SiteMediator};
use neon_core::module::{ModuleInfo, ModuleInstance, ModuleKind};
use neon_core::registry::ModuleRegistry;
use neon_server::Server;

use common::{NullFetch, NullStore, section};

type EventLog = Arc<Mutex<Vec<&'static str>>>;

struct RecordingListenerModule {
    events: EventLog,
    stop: CancellationToken,
}

#[async_trait]
impl ListenerModule for RecordingListenerModule {
    fn init(&mut self, _config: Value) -> Result<(), ModuleError> {
        Ok(())
    }

    fn register(&mut self, _inherited: Vec<TcpListener>) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn serve(&self, _handler: Arc<dyn HttpHandler>) -> Result<(), ModuleError> {
        self.stop.cancelled().await;
        Ok(())
    }

    async fn shutdown(&self, _timeout: Duration) -> Result<(), ModuleError> {
        self.events.lock().push("listener.shutdown");
        self.stop.cancel();
        Ok(())
    }

    fn close(&self) -> Result<(), ModuleError> {
        self.events.lock().push("listener.close");
        self.stop.cancel();
        Ok(())
    }

    fn listeners(&self) -> std::io::Result<Vec<TcpListener>> {
        Ok(Vec::new())
    }
}

struct RecordingHandlerModule {
    events: EventLog,
    mediator: Arc<Mutex<Option<Arc<dyn SiteMediator>>>>,
}

#[async_trait]
impl HandlerModule for RecordingHandlerModule {
    fn init(&mut self, _config: Value) -> Result<(), ModuleError> {
        Ok(())
    }

    fn register(&mut self, site: Arc<dyn SiteMediator>) -> Result<(), ModuleError> {
        *self.mediator.lock() = Some(Arc::clone(&site));
        site.register_handler(handler_fn(|_request: HttpRequest| async {
            status_response(StatusCode::OK)
        }))
        .map_err(ModuleError::other)
    }

    async fn start(&self) -> Result<(), ModuleError> {
        self.events.lock().push("site.start");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        self.events.lock().push("site.stop");
        Ok(())
    }
}

struct Harness {
    events: EventLog,
    mediator: Arc<Mutex<Option<Arc<dyn SiteMediator>>>>,
    registry: Arc<ModuleRegistry>,
}

fn harness() -> Harness {
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mediator: Arc<Mutex<Option<Arc<dyn SiteMediator>>>> = Arc::new(Mutex::new(None));
    let registry = ModuleRegistry::new();
    {
        let events = Arc::clone(&events);
        registry
            .register(ModuleInfo::new(
                ModuleKind::Listener.id_for("recording"),
                ModuleKind::Listener,
                move || {
                    ModuleInstance::Listener(Box::new(RecordingListenerModule {
                        events: Arc::clone(&events),
                        stop: CancellationToken::new(),
                    }))
                },
            ))
            .unwrap();
    }
    {
        let events = Arc::clone(&events);
        let mediator = Arc::clone(&mediator);
        registry
            .register(ModuleInfo::new(
                ModuleKind::Handler.id_for("recording"),
                ModuleKind::Handler,
                move || {
                    ModuleInstance::Handler(Box::new(RecordingHandlerModule {
                        events: Arc::clone(&events),
                        mediator: Arc::clone(&mediator),
                    }))
                },
            ))
            .unwrap();
    }
    Harness {
        events,
        mediator,
        registry: Arc::new(registry),
    }
}

async fn started_server(harness: &Harness) -> Server {
    let config = section(json!({
        "listeners": {"l1": {"recording": {}}},
        "sites": {
            "s1": {
                "listeners": ["l1"],
                "routes": {"/": {"handler": {"recording": {}}}}
            }
        }
    }));
    let mut server = Server::init(
        &config,
        &harness.registry,
        Arc::new(NullStore),
        Arc::new(NullFetch),
        false,
    )
    .unwrap();
    server.register(Default::default()).unwrap();
    server.start().await.unwrap();
    server
}

#[tokio::test]
async fn stop_closes_listeners_before_stopping_sites() {
    let harness = harness();
    let mut server = started_server(&harness).await;

    server.stop().await;

    let events = harness.events.lock().clone();
    let close = events.iter().position(|event| *event == "listener.close");
    let site_stop = events.iter().position(|event| *event == "site.stop");
    assert!(close.unwrap() < site_stop.unwrap(), "events: {events:?}");
}

#[tokio::test]
async fn shutdown_drains_listeners_before_stopping_sites() {
    let harness = harness();
    let mut server = started_server(&harness).await;

    server.shutdown(Duration::from_secs(1)).await.unwrap();

    let events = harness.events.lock().clone();
    let drain = events
        .iter()
        .position(|event| *event == "listener.shutdown");
    let site_stop = events.iter().position(|event| *event == "site.stop");
    assert!(drain.unwrap() < site_stop.unwrap(), "events: {events:?}");
}

#[tokio::test]
async fn mediator_registrations_are_rejected_outside_the_register_phase() {
    let harness = harness();
    let mut server = started_server(&harness).await;

    // The module stashed its mediator during register; registrations are
    // rejected once the site has left the registering phase.
    let mediator = harness.mediator.lock().clone().unwrap();
    let err = mediator
        .register_handler(handler_fn(|_request: HttpRequest| async {
            status_response(StatusCode::OK)
        }))
        .unwrap_err();
    assert!(matches!(err, MediatorError::NotRegistering));

    server.stop().await;

    let err = mediator
        .register_middleware(Arc::new(NoopMiddleware))
        .unwrap_err();
    assert!(matches!(err, MediatorError::NotRegistering));
}

struct NoopMiddleware;

impl neon_core::http::HttpMiddleware for NoopMiddleware {
    fn wrap(&self, next: Arc<dyn HttpHandler>) -> Arc<dyn HttpHandler> {
        next
    }
}

/// Registers its handler twice; the route can only take one terminal.
struct GreedyHandlerModule {
    saw_duplicate_rejection: Arc<Mutex<bool>>,
}

#[async_trait]
impl HandlerModule for GreedyHandlerModule {
    fn init(&mut self, _config: Value) -> Result<(), ModuleError> {
        Ok(())
    }

    fn register(&mut self, site: Arc<dyn SiteMediator>) -> Result<(), ModuleError> {
        let handler = || {
            handler_fn(|_request: HttpRequest| async { status_response(StatusCode::OK) })
        };
        site.register_handler(handler()).map_err(ModuleError::other)?;
        if let Err(MediatorError::HandlerAlreadyRegistered(_)) = site.register_handler(handler()) {
            *self.saw_duplicate_rejection.lock() = true;
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }
}

#[tokio::test]
async fn duplicate_handler_registration_is_rejected() {
    let saw_duplicate_rejection = Arc::new(Mutex::new(false));
    let registry = ModuleRegistry::new();
    {
        let saw = Arc::clone(&saw_duplicate_rejection);
        registry
            .register(ModuleInfo::new(
                ModuleKind::Handler.id_for("greedy"),
                ModuleKind::Handler,
                move || {
                    ModuleInstance::Handler(Box::new(GreedyHandlerModule {
                        saw_duplicate_rejection: Arc::clone(&saw),
                    }))
                },
            ))
            .unwrap();
    }
    registry
        .register(ModuleInfo::new(
            ModuleKind::Listener.id_for("stub"),
            ModuleKind::Listener,
            || ModuleInstance::Listener(Box::new(common::StubListenerModule::default())),
        ))
        .unwrap();

    let config = section(json!({
        "listeners": {"l1": {"stub": {}}},
        "sites": {
            "s1": {
                "listeners": ["l1"],
                "routes": {"/": {"handler": {"greedy": {}}}}
            }
        }
    }));
    let mut server = Server::init(
        &config,
        &Arc::new(registry),
        Arc::new(NullStore),
        Arc::new(NullFetch),
        false,
    )
    .unwrap();
    server.register(Default::default()).unwrap();

    assert!(*saw_duplicate_rejection.lock());
}
