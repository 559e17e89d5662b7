//! Process-wide `tracing` subscriber setup.
//!
//! Diagnostics go to stderr so stdout stays reserved for relayed job output.
//! `BATCHWATCH_LOG` holds an `EnvFilter` directive (default `info`) and
//! `BATCHWATCH_LOG_FORMAT` selects `compact` (default) or `json`.

use std::env;
use std::io;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Environment variable carrying the filter directive.
pub const LOG_FILTER_ENV: &str = "BATCHWATCH_LOG";

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "BATCHWATCH_LOG_FORMAT";

const DEFAULT_FILTER: &str = "info";

/// Output format of log records.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogFormat {
    /// Single-line human readable records.
    #[default]
    Compact,
    /// One JSON object per record.
    Json,
}

impl LogFormat {
    /// Parses a format name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`LoggingError::Format`] for unknown names.
    pub fn parse(value: &str) -> Result<Self, LoggingError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(LoggingError::Format(value.to_owned())),
        }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive did not parse.
    #[error("invalid BATCHWATCH_LOG directive: {0}")]
    Filter(String),
    /// The format name is unknown.
    #[error("unknown BATCHWATCH_LOG_FORMAT value {0:?}; expected compact or json")]
    Format(String),
    /// A global subscriber was already installed.
    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Builds the filter from `directive`, falling back to `info` when unset.
///
/// # Errors
///
/// Returns [`LoggingError::Filter`] when the directive is malformed.
pub fn filter(directive: Option<&str>) -> Result<EnvFilter, LoggingError> {
    let text = directive
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(text).map_err(|err| LoggingError::Filter(err.to_string()))
}

/// Installs the global subscriber from the process environment.
///
/// # Errors
///
/// Returns [`LoggingError`] when the environment is malformed or a
/// subscriber is already installed.
pub fn init() -> Result<(), LoggingError> {
    let directive = env::var(LOG_FILTER_ENV).ok();
    let format = env::var(LOG_FORMAT_ENV)
        .map_or_else(|_| Ok(LogFormat::default()), |value| LogFormat::parse(&value))?;
    let registry = Registry::default().with(filter(directive.as_deref())?);

    let installed = match format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(io::stderr),
            )
            .try_init(),
    };
    installed.map_err(|err| LoggingError::Install(err.to_string()))
}
