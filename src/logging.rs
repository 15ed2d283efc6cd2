//! Structured logging setup.
//!
//! Everything logs through `tracing`. Use these field names consistently:
//! `tab_id`, `window_id`, `group_id`, `token`, `policy`.
//!
//! Output always goes to stderr: the bridge binary owns stdout for its
//! line protocol.

use std::sync::OnceLock;

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};

static LOGGING_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Error type for logging initialization
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("invalid log filter {0:?}: {1}")]
    InvalidFilter(String, String),

    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Calling this again after
/// a successful call does nothing.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    if LOGGING_INITIALIZED.get().is_some() {
        return Ok(());
    }

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| LogError::InvalidFilter(config.level.clone(), e.to_string()))?,
    };

    match config.format {
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_ansi(true),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true)
                    .flatten_event(true),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    let _ = LOGGING_INITIALIZED.set(true);
    tracing::debug!(log_level = %config.level, log_format = %config.format, "logging initialized");
    Ok(())
}

pub fn is_logging_initialized() -> bool {
    LOGGING_INITIALIZED.get().is_some()
}
