//! The loader: timed, bounded-concurrency execution of parser rules.
//!
//! The loader periodically drives parser modules that pull external data
//! through the fetcher and place resources into the store. A failing run
//! switches the scheduler into failsafe mode, shortening the period until
//! a clean run is observed.

mod config;
mod scheduler;

pub use config::LoaderConfig;

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use neon_core::contract::ParserModule;
use neon_core::error::{ModuleError, RegistryError};
use neon_core::mediator::{FetchMediator, StoreMediator};
use neon_core::module::{ModuleKind, select_kind};
use neon_core::registry::ModuleRegistry;

use crate::scheduler::Scheduler;

/// Error raised while configuring the loader.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The option map failed to decode or holds an invalid bound.
    #[error("loader config: {0}")]
    Config(String),

    /// A rule entry does not select exactly one parser.
    #[error("rule '{rule}': {reason}")]
    Rule {
        /// The rule name.
        rule: String,
        /// Why the rule is invalid.
        reason: String,
    },

    /// A parser module could not be created.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A parser module failed to initialize.
    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// One configured rule bound to its parser module.
pub(crate) struct LoaderRule {
    pub(crate) name: String,
    pub(crate) parser: Arc<dyn ParserModule>,
}

/// The loader scheduler.
///
/// Owns its worker pool and ticker exclusively; the store and fetcher are
/// shared with handlers through mediators.
pub struct Loader {
    config: LoaderConfig,
    rules: Arc<Vec<LoaderRule>>,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Loader {
    /// Validates the loader configuration, one report line per problem.
    #[must_use]
    pub fn check(config: &Map<String, Value>, registry: &ModuleRegistry) -> Vec<String> {
        let mut report = Vec::new();
        match parse_options(config) {
            Ok(options) => {
                if options.exec_workers == 0 {
                    report.push("loader: execWorkers must be at least 1".to_string());
                }
            }
            Err(reason) => report.push(format!("loader: {reason}")),
        }
        for (rule, selection) in rule_entries(config) {
            match selection {
                Ok((kind, _)) => {
                    if !registry.has_kind(ModuleKind::Parser, kind) {
                        report.push(format!(
                            "loader: rule '{rule}': unknown module '{}'",
                            ModuleKind::Parser.id_for(kind)
                        ));
                    }
                }
                Err(reason) => report.push(format!("loader: rule '{rule}': {reason}")),
            }
        }
        report
    }

    /// Decodes the options and initializes every rule's parser module.
    ///
    /// # Errors
    ///
    /// Returns a [`LoaderError`] on invalid options, a bad rule selection,
    /// an unknown module or a parser init failure.
    pub fn init(config: &Map<String, Value>, registry: &ModuleRegistry) -> Result<Self, LoaderError> {
        let options = parse_options(config).map_err(LoaderError::Config)?;
        if options.exec_workers == 0 {
            return Err(LoaderError::Config(
                "execWorkers must be at least 1".to_string(),
            ));
        }

        let mut rules = Vec::new();
        for (rule, selection) in rule_entries(config) {
            let (kind, parser_config) = selection.map_err(|reason| LoaderError::Rule {
                rule: rule.clone(),
                reason,
            })?;
            let mut parser = registry.create_parser(kind)?;
            parser.init(parser_config.clone())?;
            tracing::debug!(
                rule,
                module = %ModuleKind::Parser.id_for(kind),
                "loader rule initialized"
            );
            rules.push(LoaderRule {
                name: rule,
                parser: Arc::from(parser),
            });
        }

        Ok(Self {
            config: options,
            rules: Arc::new(rules),
            stop: CancellationToken::new(),
            task: None,
        })
    }

    /// Starts the scheduler task.
    ///
    /// With both the startup delay and the periodic interval at zero no
    /// task is started at all.
    pub fn start(&mut self, store: Arc<dyn StoreMediator>, fetch: Arc<dyn FetchMediator>) {
        if !self.config.execution_enabled() {
            tracing::info!("loader execution disabled");
            return;
        }
        let scheduler = Scheduler {
            config: self.config.clone(),
            rules: Arc::clone(&self.rules),
            store,
            fetch,
            stop: self.stop.clone(),
        };
        tracing::info!(
            rules = self.rules.len(),
            workers = self.config.exec_workers,
            "loader started"
        );
        self.task = Some(tokio::spawn(scheduler.run()));
    }

    /// Stops the scheduler and aborts in-flight workers at their next
    /// await point.
    pub async fn stop(&mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::info!("loader stopped");
    }

    /// Returns true while the scheduler task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// The effective execution options.
    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }
}

impl core::fmt::Debug for Loader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("rules", &self.rules.len())
            .finish()
    }
}

fn parse_options(config: &Map<String, Value>) -> Result<LoaderConfig, String> {
    serde_json::from_value(Value::Object(config.clone())).map_err(|err| err.to_string())
}

/// Iterates `{rules: {<name>: {<parserKind>: <cfg>}}}` entries.
fn rule_entries(
    config: &Map<String, Value>,
) -> impl Iterator<Item = (String, Result<(&str, &Value), String>)> {
    let entries = match config.get("rules") {
        Some(Value::Object(rules)) => rules.iter().collect::<Vec<_>>(),
        _ => Vec::new(),
    };
    entries.into_iter().map(|(rule, selection)| {
        let resolved = match selection {
            Value::Object(map) => select_kind(map).map_err(|err| err.to_string()),
            _ => Err("rule entry must be a mapping".to_string()),
        };
        (rule.clone(), resolved)
    })
}
