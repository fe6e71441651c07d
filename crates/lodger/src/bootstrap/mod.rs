//! Kernel bootstrap orchestration.
//!
//! A [`BootstrapSequence`] runs an ordered list of [`BootstrapStep`]s against
//! the application container at most once. The outcome, success or failure,
//! is cached: later calls return it again without re-running anything, and
//! concurrent first calls block until the single run finishes.
//!
//! [`BootstrapSequence::standard`] wires the default steps:
//!
//! 1. `load-environment` snapshots `LODGER_*` process variables.
//! 2. `load-configuration` loads [`Config`] through a [`ConfigLoader`].
//! 3. `handle-exceptions` installs telemetry, a panic hook and the default
//!    exception handler.
//! 4. `register-services` calls `register` on each service provider.
//! 5. `bind-host-adapters` binds the [`crate::HostContext`].
//! 6. `boot-services` calls `boot` on each service provider.

mod environment;
mod providers;
mod steps;

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use lodger_config::Config;

use crate::container::{Container, ContainerError};
use crate::health::HealthReporter;
use crate::telemetry::TelemetryError;

pub use environment::Environment;
pub use providers::{ProviderError, ProviderPhase, ServiceProvider, ServiceProviders};
pub use steps::{
    BindHostAdapters, BootProviders, HandleExceptions, LoadConfiguration, LoadEnvironment,
    RegisterProviders,
};

pub(crate) const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the kernel configuration.
    ///
    /// # Errors
    ///
    /// Returns the layered loader's error when a source cannot be parsed.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`], reading the process arguments,
/// environment and configuration files.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// A service provider failed to register or boot.
    #[error("service provider '{provider}' failed to {phase}: {source}")]
    Provider {
        /// Provider name.
        provider: String,
        /// Lifecycle phase that failed.
        phase: ProviderPhase,
        /// Error reported by the provider.
        #[source]
        source: ProviderError,
    },
    /// A step could not resolve a service it depends on.
    #[error("bootstrap step '{step}' could not resolve a service: {source}")]
    Container {
        /// Failing step.
        step: &'static str,
        /// Container lookup error.
        #[source]
        source: ContainerError,
    },
    /// A custom step failed.
    #[error("bootstrap step '{step}' failed: {message}")]
    Step {
        /// Failing step.
        step: &'static str,
        /// Failure description.
        message: String,
    },
}

impl BootstrapError {
    /// Builds a failure for a custom step.
    #[must_use]
    pub fn step(step: &'static str, message: impl Into<String>) -> Self {
        Self::Step {
            step,
            message: message.into(),
        }
    }

    /// Name of the step that failed.
    #[must_use]
    pub const fn failed_step(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => LoadConfiguration::NAME,
            Self::Telemetry { .. } => HandleExceptions::NAME,
            Self::Provider {
                phase: ProviderPhase::Register,
                ..
            } => RegisterProviders::NAME,
            Self::Provider {
                phase: ProviderPhase::Boot,
                ..
            } => BootProviders::NAME,
            Self::Container { step, .. } | Self::Step { step, .. } => *step,
        }
    }
}

/// Named unit of kernel initialisation.
pub trait BootstrapStep: Send + Sync {
    /// Stable step name used in logs and health events.
    fn name(&self) -> &'static str;

    /// Runs the step against the shared container.
    ///
    /// # Errors
    ///
    /// Returns the reason the step could not complete. Bootstrap stops at
    /// the first failing step.
    fn run(&self, container: &Container) -> Result<(), BootstrapError>;
}

/// Ordered, run-once list of bootstrap steps.
pub struct BootstrapSequence {
    steps: Vec<Box<dyn BootstrapStep>>,
    reporter: Arc<dyn HealthReporter>,
    outcome: OnceCell<Result<(), Arc<BootstrapError>>>,
}

impl fmt::Debug for BootstrapSequence {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BootstrapSequence")
            .field("steps", &self.step_names())
            .field("outcome", &self.outcome.get())
            .finish_non_exhaustive()
    }
}

impl BootstrapSequence {
    /// Creates an empty sequence reporting to `reporter`.
    #[must_use]
    pub fn new(reporter: Arc<dyn HealthReporter>) -> Self {
        Self {
            steps: Vec::new(),
            reporter,
            outcome: OnceCell::new(),
        }
    }

    /// Creates the standard six-step sequence.
    #[must_use]
    pub fn standard(loader: Arc<dyn ConfigLoader>, reporter: Arc<dyn HealthReporter>) -> Self {
        Self::new(reporter)
            .with_step(LoadEnvironment::default())
            .with_step(LoadConfiguration::new(loader))
            .with_step(HandleExceptions)
            .with_step(RegisterProviders)
            .with_step(BindHostAdapters)
            .with_step(BootProviders)
    }

    /// Appends a step, builder style.
    #[must_use]
    pub fn with_step<S>(mut self, step: S) -> Self
    where
        S: BootstrapStep + 'static,
    {
        self.steps.push(Box::new(step));
        self
    }

    /// Names of the registered steps, in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Runs every step once.
    ///
    /// # Errors
    ///
    /// Returns the first step failure. The failure is cached and returned by
    /// every later call.
    pub fn run(&self, container: &Container) -> Result<(), Arc<BootstrapError>> {
        self.outcome
            .get_or_init(|| self.run_steps(container))
            .clone()
    }

    /// Returns `true` once the sequence has run, whether or not it
    /// succeeded.
    #[must_use]
    pub fn has_been_bootstrapped(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Cached failure from the run, if there was one.
    #[must_use]
    pub fn failure(&self) -> Option<Arc<BootstrapError>> {
        match self.outcome.get() {
            Some(Err(error)) => Some(Arc::clone(error)),
            Some(Ok(())) | None => None,
        }
    }

    fn run_steps(&self, container: &Container) -> Result<(), Arc<BootstrapError>> {
        self.reporter.bootstrap_starting();
        for step in &self.steps {
            tracing::debug!(target: BOOTSTRAP_TARGET, step = step.name(), "running bootstrap step");
            if let Err(error) = step.run(container) {
                self.reporter.bootstrap_failed(&error);
                return Err(Arc::new(error));
            }
            self.reporter.step_completed(step.name());
        }
        self.reporter.bootstrap_succeeded(&self.step_names());
        Ok(())
    }
}
