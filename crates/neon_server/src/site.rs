//! A virtual site: configuration, module registration and the route table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Map, Value};

use neon_core::contract::{HandlerModule, MiddlewareModule};
use neon_core::http::{HttpHandler, HttpMiddleware, HttpRequest, HttpResponse, status_response};
use neon_core::mediator::{FetchMediator, MediatorError, SiteMediator, StoreMediator};
use neon_core::module::{ModuleKind, select_kind};
use neon_core::registry::ModuleRegistry;

use crate::envelope::Envelope;
use crate::error::ServerError;
use crate::router::{RouteKey, RouteTable};

/// The special pattern applying to every route without its own stack.
pub const DEFAULT_PATTERN: &str = "default";

/// The root pattern, always present in a built route table.
pub const ROOT_PATTERN: &str = "/";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SiteConfig {
    listeners: Vec<String>,
    hosts: Vec<String>,
    routes: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RouteConfig {
    middlewares: Map<String, Value>,
    handler: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SitePhase {
    #[default]
    Created,
    Registering,
    Registered,
    Started,
    Stopped,
}

#[derive(Default)]
struct SiteState {
    phase: SitePhase,
    current_route: Option<String>,
    route_middlewares: HashMap<String, Vec<Arc<dyn HttpMiddleware>>>,
    route_handlers: HashMap<String, Arc<dyn HttpHandler>>,
    middleware_modules: Vec<Arc<dyn MiddlewareModule>>,
    handler_modules: Vec<Arc<dyn HandlerModule>>,
    router: Option<Arc<RouteTable>>,
}

/// One virtual site: a routing tree served through one or more listeners.
///
/// The site's router is built during [`register`](Self::register) and is
/// non-null only after it succeeds.
pub struct ServerSite {
    name: String,
    config: SiteConfig,
    registry: Arc<ModuleRegistry>,
    store: Arc<dyn StoreMediator>,
    fetch: Arc<dyn FetchMediator>,
    debug: bool,
    state: Arc<RwLock<SiteState>>,
}

impl ServerSite {
    /// Validates a site configuration, one report line per problem.
    #[must_use]
    pub fn check(name: &str, config: &Map<String, Value>, registry: &ModuleRegistry) -> Vec<String> {
        let mut report = Vec::new();
        let config: SiteConfig = match serde_json::from_value(Value::Object(config.clone())) {
            Ok(config) => config,
            Err(err) => {
                report.push(format!("site '{name}': {err}"));
                return report;
            }
        };

        if config.listeners.is_empty() {
            report.push(format!("site '{name}': must reference at least one listener"));
        }

        for (pattern, route) in &config.routes {
            if pattern != DEFAULT_PATTERN && !pattern.starts_with('/') {
                report.push(format!(
                    "site '{name}': route pattern '{pattern}' must begin with '/'"
                ));
            }
            let route: RouteConfig = match serde_json::from_value(route.clone()) {
                Ok(route) => route,
                Err(err) => {
                    report.push(format!("site '{name}': route '{pattern}': {err}"));
                    continue;
                }
            };
            for kind in route.middlewares.keys() {
                if !registry.has_kind(ModuleKind::Middleware, kind) {
                    report.push(format!(
                        "site '{name}': route '{pattern}': unknown module '{}'",
                        ModuleKind::Middleware.id_for(kind)
                    ));
                }
            }
            if !route.handler.is_empty() {
                match select_kind(&route.handler) {
                    Ok((kind, _)) => {
                        if !registry.has_kind(ModuleKind::Handler, kind) {
                            report.push(format!(
                                "site '{name}': route '{pattern}': unknown module '{}'",
                                ModuleKind::Handler.id_for(kind)
                            ));
                        }
                    }
                    Err(err) => {
                        report.push(format!("site '{name}': route '{pattern}': handler: {err}"));
                    }
                }
            }
        }
        report
    }

    /// Parses and validates the site configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Site`] on the first configuration problem.
    pub fn new(
        name: impl Into<String>,
        config: &Map<String, Value>,
        registry: Arc<ModuleRegistry>,
        store: Arc<dyn StoreMediator>,
        fetch: Arc<dyn FetchMediator>,
        debug: bool,
    ) -> Result<Self, ServerError> {
        let name = name.into();
        let report = Self::check(&name, config, &registry);
        if let Some(reason) = report.into_iter().next() {
            return Err(ServerError::Site { name, reason });
        }
        let config: SiteConfig = serde_json::from_value(Value::Object(config.clone()))
            .map_err(|err| ServerError::Site {
                name: name.clone(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            name,
            config,
            registry,
            store,
            fetch,
            debug,
            state: Arc::new(RwLock::new(SiteState::default())),
        })
    }

    /// The site name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the site has no host list and therefore receives traffic
    /// whose Host header matches no hosted site.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.config.hosts.is_empty()
    }

    /// The listener names the site wishes to be bound to.
    #[must_use]
    pub fn listener_names(&self) -> &[String] {
        &self.config.listeners
    }

    /// The site's route table; `None` until `register` succeeds.
    #[must_use]
    pub fn router(&self) -> Option<Arc<RouteTable>> {
        self.state.read().router.clone()
    }

    /// Creates and registers every route's modules, then builds the
    /// routing table.
    ///
    /// # Errors
    ///
    /// The first module creation, init or registration failure aborts.
    pub fn register(&self) -> Result<(), ServerError> {
        self.state.write().phase = SitePhase::Registering;
        let mediator: Arc<dyn SiteMediator> = Arc::new(SiteMediatorImpl {
            name: self.name.clone(),
            listeners: self.config.listeners.clone(),
            hosts: self.config.hosts.clone(),
            store: Arc::clone(&self.store),
            fetch: Arc::clone(&self.fetch),
            state: Arc::clone(&self.state),
        });

        for (pattern, route) in &self.config.routes {
            let route: RouteConfig =
                serde_json::from_value(route.clone()).map_err(|err| ServerError::Site {
                    name: self.name.clone(),
                    reason: err.to_string(),
                })?;
            self.state.write().current_route = Some(pattern.clone());

            for (kind, module_config) in &route.middlewares {
                let mut module = self.registry.create_middleware(kind)?;
                module.init(module_config.clone())?;
                module.register(Arc::clone(&mediator))?;
                self.state.write().middleware_modules.push(Arc::from(module));
            }

            if !route.handler.is_empty() {
                let (kind, module_config) =
                    select_kind(&route.handler).map_err(|err| ServerError::Site {
                        name: self.name.clone(),
                        reason: err.to_string(),
                    })?;
                let mut module = self.registry.create_handler(kind)?;
                module.init(module_config.clone())?;
                module.register(Arc::clone(&mediator))?;
                self.state.write().handler_modules.push(Arc::from(module));
            }
        }

        let table = {
            let mut state = self.state.write();
            state.current_route = None;
            self.build_table(&state)
        };
        let mut state = self.state.write();
        state.router = Some(Arc::new(table));
        state.phase = SitePhase::Registered;
        tracing::debug!(site = self.name, "site registered");
        Ok(())
    }

    /// Starts every middleware and handler module registered by the site.
    ///
    /// # Errors
    ///
    /// The first module start failure aborts.
    pub async fn start(&self) -> Result<(), ServerError> {
        let (middlewares, handlers) = {
            let state = self.state.read();
            (
                state.middleware_modules.clone(),
                state.handler_modules.clone(),
            )
        };
        for module in middlewares {
            module.start().await?;
        }
        for module in handlers {
            module.start().await?;
        }
        self.state.write().phase = SitePhase::Started;
        tracing::info!(site = self.name, "site started");
        Ok(())
    }

    /// Stops every module registered by the site. Stop failures are
    /// logged, never propagated.
    pub async fn stop(&self) {
        let (middlewares, handlers) = {
            let state = self.state.read();
            (
                state.middleware_modules.clone(),
                state.handler_modules.clone(),
            )
        };
        for module in middlewares {
            if let Err(err) = module.stop().await {
                tracing::warn!(site = self.name, error = %err, "middleware stop failed");
            }
        }
        for module in handlers {
            if let Err(err) = module.stop().await {
                tracing::warn!(site = self.name, error = %err, "handler stop failed");
            }
        }
        self.state.write().phase = SitePhase::Stopped;
        tracing::info!(site = self.name, "site stopped");
    }

    /// Builds the effective route table from the registered stacks.
    fn build_table(&self, state: &SiteState) -> RouteTable {
        let envelope = Envelope::new(self.debug);
        let not_found: Arc<dyn HttpHandler> = Arc::new(NotFoundHandler);

        let mut patterns: Vec<String> = self
            .config
            .routes
            .keys()
            .filter(|pattern| pattern.as_str() != DEFAULT_PATTERN)
            .cloned()
            .collect();
        if !patterns.iter().any(|pattern| pattern == ROOT_PATTERN) {
            // The default stack is rewritten onto the root so the root is
            // always routable.
            patterns.push(ROOT_PATTERN.to_string());
        }

        let mut table = RouteTable::new();
        for pattern in patterns {
            let terminal = state
                .route_handlers
                .get(&pattern)
                .or_else(|| state.route_handlers.get(DEFAULT_PATTERN))
                .cloned()
                .unwrap_or_else(|| Arc::clone(&not_found));

            let mut handler = terminal;
            for middleware in resolve_chain(state, &pattern).iter().rev() {
                handler = middleware.wrap(handler);
            }
            let handler = envelope.wrap(handler);

            if self.config.hosts.is_empty() {
                table.insert(RouteKey::pattern(pattern), handler);
            } else {
                for host in &self.config.hosts {
                    table.insert(
                        RouteKey::hosted(host.clone(), pattern.clone()),
                        Arc::clone(&handler),
                    );
                }
            }
        }
        table
    }
}

impl core::fmt::Debug for ServerSite {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServerSite")
            .field("name", &self.name)
            .field("listeners", &self.config.listeners)
            .field("hosts", &self.config.hosts)
            .finish_non_exhaustive()
    }
}

/// Resolves the middleware chain for a pattern: the pattern's own chain,
/// else the nearest path-parent chain, else the site default chain.
fn resolve_chain(state: &SiteState, pattern: &str) -> Vec<Arc<dyn HttpMiddleware>> {
    let mut current = pattern.to_string();
    loop {
        if let Some(chain) = chain_at(state, &current) {
            return chain;
        }
        if current == ROOT_PATTERN {
            break;
        }
        current = parent_pattern(&current);
    }
    state
        .route_middlewares
        .get(DEFAULT_PATTERN)
        .cloned()
        .unwrap_or_default()
}

/// Looks up a chain defined for `pattern`, accepting the subtree spelling
/// (`/a/`) when the plain one (`/a`) is absent and vice versa.
fn chain_at(state: &SiteState, pattern: &str) -> Option<Vec<Arc<dyn HttpMiddleware>>> {
    if let Some(chain) = state.route_middlewares.get(pattern) {
        return Some(chain.clone());
    }
    if pattern != ROOT_PATTERN {
        let alternate = match pattern.strip_suffix('/') {
            Some(stripped) => stripped.to_string(),
            None => format!("{pattern}/"),
        };
        if let Some(chain) = state.route_middlewares.get(&alternate) {
            return Some(chain.clone());
        }
    }
    None
}

fn parent_pattern(pattern: &str) -> String {
    let trimmed = pattern.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => ROOT_PATTERN.to_string(),
        Some(index) => trimmed[..index].to_string(),
    }
}

struct NotFoundHandler;

#[async_trait]
impl HttpHandler for NotFoundHandler {
    async fn handle(&self, _request: HttpRequest) -> HttpResponse {
        status_response(StatusCode::NOT_FOUND)
    }
}

struct SiteMediatorImpl {
    name: String,
    listeners: Vec<String>,
    hosts: Vec<String>,
    store: Arc<dyn StoreMediator>,
    fetch: Arc<dyn FetchMediator>,
    state: Arc<RwLock<SiteState>>,
}

impl SiteMediator for SiteMediatorImpl {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn listeners(&self) -> Vec<String> {
        self.listeners.clone()
    }

    fn hosts(&self) -> Vec<String> {
        self.hosts.clone()
    }

    fn store(&self) -> Arc<dyn StoreMediator> {
        Arc::clone(&self.store)
    }

    fn fetch(&self) -> Arc<dyn FetchMediator> {
        Arc::clone(&self.fetch)
    }

    fn register_middleware(&self, middleware: Arc<dyn HttpMiddleware>) -> Result<(), MediatorError> {
        let mut state = self.state.write();
        if state.phase != SitePhase::Registering {
            return Err(MediatorError::NotRegistering);
        }
        let Some(route) = state.current_route.clone() else {
            return Err(MediatorError::NotRegistering);
        };
        state
            .route_middlewares
            .entry(route)
            .or_default()
            .push(middleware);
        Ok(())
    }

    fn register_handler(&self, handler: Arc<dyn HttpHandler>) -> Result<(), MediatorError> {
        let mut state = self.state.write();
        if state.phase != SitePhase::Registering {
            return Err(MediatorError::NotRegistering);
        }
        let Some(route) = state.current_route.clone() else {
            return Err(MediatorError::NotRegistering);
        };
        if state.route_handlers.contains_key(&route) {
            return Err(MediatorError::HandlerAlreadyRegistered(route));
        }
        state.route_handlers.insert(route, handler);
        Ok(())
    }
}
