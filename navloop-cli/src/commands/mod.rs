//! CLI command implementations.

pub mod cache;
pub mod simulate;

use std::path::Path;

use navloop::logging::{default_log_dir, init_logging, LoggingGuard, DEFAULT_LOG_FILE};
use navloop::NavigationConfig;

use crate::error::CliError;

/// Load configuration from `path`, or the user config file when `None`.
pub fn load_config(path: Option<&Path>) -> Result<NavigationConfig, CliError> {
    let config = match path {
        Some(path) => NavigationConfig::load_from(path)?,
        None => NavigationConfig::load()?,
    };
    Ok(config)
}

/// Initialize logging into the default log directory.
pub fn init_cli_logging() -> Result<LoggingGuard, CliError> {
    init_logging(&default_log_dir(), DEFAULT_LOG_FILE)
        .map_err(|e| CliError::LoggingInit(e.to_string()))
}

/// Build a multi-threaded tokio runtime.
pub fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}
