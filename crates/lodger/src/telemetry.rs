//! Tracing setup for the kernel and its host adapter.
//!
//! The configured subscriber is installed by the `handle-exceptions`
//! bootstrap step, so its filter and format come from the loaded
//! [`Config`]. Anything logged before that point (an invalid middleware
//! reference, a configuration file that fails to parse) has no subscriber
//! to land in; [`install_fallback`] gives the host adapter a plain stderr
//! sink for reporting those failures.
//!
//! Only one global subscriber can exist per process. Whichever is installed
//! first wins and the other call keeps it.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

use lodger_config::{Config, DEFAULT_LOG_FILTER, LogFormat};

const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the configured subscriber on first use.
///
/// Every kernel in the process may call this during bootstrap; only the
/// first call touches global state. A subscriber installed earlier by a
/// test harness or [`install_fallback`] is left in place.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an invalid filter expression.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|()| TelemetryHandle)
}

/// Installs a compact stderr subscriber using the default filter when no
/// subscriber exists yet.
///
/// Returns `true` when this call installed it.
#[must_use]
pub fn install_fallback() -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new(DEFAULT_LOG_FILTER))
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |env_filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    match tracing::subscriber::set_global_default(subscriber) {
        Ok(()) => Ok(()),
        Err(_) if tracing::dispatcher::has_been_set() => {
            tracing::debug!(
                target: TELEMETRY_TARGET,
                "tracing subscriber already installed; keeping it"
            );
            Ok(())
        }
        Err(error) => Err(TelemetryError::Subscriber(error)),
    }
}
