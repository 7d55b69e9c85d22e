pub mod config;
pub mod layers;

pub use layers::console::{ConsoleOutput, LogFormat};

use crate::logging::config::LoggingConfig;
use crate::logging::layers::console;
use crate::Result;
use anyhow::{anyhow, Context};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "PIPELINE_CONVERT_LOG";

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the logging framework once per process.
///
/// Filter precedence: `-v` flags, then `PIPELINE_CONVERT_LOG`, then
/// `RUST_LOG`, then the configured default level.
pub fn init(config: &LoggingConfig, verbose: bool, document_on_stdout: bool) -> Result<ConsoleOutput> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let env_filter = if verbose {
        EnvFilter::try_new(&config.default_level)
    } else {
        EnvFilter::try_from_env(LOG_ENV_VAR)
            .or_else(|_| EnvFilter::try_from_default_env())
            .or_else(|_| EnvFilter::try_new(&config.default_level))
    }
    .context("failed to configure tracing level")?;

    let console_output = console::select_console_output(config.console_output, document_on_stdout);
    let console_layer = console::console_layer::<Registry>(console_output, config.format);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(env_filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(console_output)
}

#[cfg(test)]
/// Reset the initialization guard so tests can reconfigure logging multiple times.
pub fn reset_for_tests() {
    LOGGER_INITIALIZED.store(false, Ordering::SeqCst);
}
