//! Crate-level error type.
//!
//! Per-tick failures never surface here: decision, fetch and store errors are
//! logged and replaced by safe values inside the tick loop. `NavigationError`
//! covers setup and teardown only.

use thiserror::Error;

use crate::config::ConfigFileError;
use crate::voice::{SpeechError, StoreError};

/// Errors starting, configuring or stopping navigation.
#[derive(Debug, Error)]
pub enum NavigationError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigFileError),

    /// The voice response store could not be opened.
    #[error("Voice response store error: {0}")]
    Store(#[from] StoreError),

    /// The speech client could not be created or flushed.
    #[error("Speech client error: {0}")]
    Speech(#[from] SpeechError),

    /// A route or replay document could not be decoded.
    #[error("Invalid route data: {0}")]
    RouteData(#[from] serde_json::Error),

    /// A background task panicked or was aborted.
    #[error("Background task failed: {0}")]
    Task(String),
}
