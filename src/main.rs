//! The neon binary: `neon [check|serve]`.

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use neon::prelude::*;

fn init_tracing() {
    let default_level = if std::env::var_os(neon_instance::DEBUG_ENV).is_some() {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let command = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    let registry = match default_registry() {
        Ok(registry) => registry,
        Err(err) => {
            tracing::error!(error = %err, "failed to build module registry");
            return ExitCode::FAILURE;
        }
    };

    let mut instance = Instance::new(config, registry);
    match command.as_str() {
        "check" => match instance.check() {
            Ok(()) => {
                tracing::info!("configuration is valid");
                ExitCode::SUCCESS
            }
            Err(err) => {
                tracing::error!("{err}");
                ExitCode::FAILURE
            }
        },
        "serve" => match instance.serve().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                tracing::error!(error = %err, "instance failed");
                ExitCode::FAILURE
            }
        },
        other => {
            tracing::error!(command = other, "unknown command, expected 'check' or 'serve'");
            ExitCode::FAILURE
        }
    }
}
