//! The standard bootstrap steps.

use std::panic;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use lodger_config::{Config, ENV_PREFIX};

use crate::container::Container;
use crate::exceptions::{ExceptionHandler, StructuredExceptionHandler};
use crate::host::HostContext;
use crate::telemetry;

use super::{
    BOOTSTRAP_TARGET, BootstrapError, BootstrapStep, ConfigLoader, Environment, ProviderPhase,
    ServiceProviders,
};

static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Snapshots prefixed process variables into an [`Environment`].
#[derive(Debug, Clone)]
pub struct LoadEnvironment {
    prefix: String,
}

impl LoadEnvironment {
    /// Step name.
    pub const NAME: &'static str = "load-environment";

    /// Captures variables starting with `prefix` instead of `LODGER_`.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LoadEnvironment {
    fn default() -> Self {
        Self::with_prefix(ENV_PREFIX)
    }
}

impl BootstrapStep for LoadEnvironment {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, container: &Container) -> Result<(), BootstrapError> {
        let environment = Environment::capture(&self.prefix);
        tracing::debug!(
            target: BOOTSTRAP_TARGET,
            prefix = %self.prefix,
            variables = environment.len(),
            "captured environment"
        );
        container.instance(environment);
        Ok(())
    }
}

/// Loads [`Config`] and binds it.
#[derive(Clone)]
pub struct LoadConfiguration {
    loader: Arc<dyn ConfigLoader>,
}

impl LoadConfiguration {
    /// Step name.
    pub const NAME: &'static str = "load-configuration";

    /// Uses `loader` to obtain the configuration.
    #[must_use]
    pub fn new(loader: Arc<dyn ConfigLoader>) -> Self {
        Self { loader }
    }
}

impl BootstrapStep for LoadConfiguration {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, container: &Container) -> Result<(), BootstrapError> {
        let config = self
            .loader
            .load()
            .map_err(|source| BootstrapError::Configuration { source })?;
        container.instance(config);
        Ok(())
    }
}

/// Installs telemetry, the panic hook and the default exception handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandleExceptions;

impl HandleExceptions {
    /// Step name.
    pub const NAME: &'static str = "handle-exceptions";
}

impl BootstrapStep for HandleExceptions {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, container: &Container) -> Result<(), BootstrapError> {
        let config = container
            .resolve::<Config>()
            .map_err(|source| BootstrapError::Container {
                step: Self::NAME,
                source,
            })?;
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
        install_panic_hook();
        if !container.has::<Arc<dyn ExceptionHandler>>() {
            container.instance::<Arc<dyn ExceptionHandler>>(Arc::new(
                StructuredExceptionHandler::new(config.exposes_errors()),
            ));
        }
        Ok(())
    }
}

fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            tracing::error!(
                target: concat!(env!("CARGO_PKG_NAME"), "::exceptions"),
                event = "panic",
                location = ?info.location(),
                "{info}"
            );
            previous(info);
        }));
    });
}

/// Calls `register` on every bound service provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterProviders;

impl RegisterProviders {
    /// Step name.
    pub const NAME: &'static str = "register-services";
}

impl BootstrapStep for RegisterProviders {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, container: &Container) -> Result<(), BootstrapError> {
        for_each_provider(container, ProviderPhase::Register)
    }
}

/// Binds the host hook table unless one is already bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindHostAdapters;

impl BindHostAdapters {
    /// Step name.
    pub const NAME: &'static str = "bind-host-adapters";
}

impl BootstrapStep for BindHostAdapters {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, container: &Container) -> Result<(), BootstrapError> {
        if !container.has::<HostContext>() {
            container.instance(HostContext::new());
        }
        Ok(())
    }
}

/// Calls `boot` on every bound service provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct BootProviders;

impl BootProviders {
    /// Step name.
    pub const NAME: &'static str = "boot-services";
}

impl BootstrapStep for BootProviders {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, container: &Container) -> Result<(), BootstrapError> {
        for_each_provider(container, ProviderPhase::Boot)
    }
}

fn for_each_provider(container: &Container, phase: ProviderPhase) -> Result<(), BootstrapError> {
    let providers = if container.has::<ServiceProviders>() {
        container
            .resolve::<ServiceProviders>()
            .map_err(|source| BootstrapError::Container {
                step: match phase {
                    ProviderPhase::Register => RegisterProviders::NAME,
                    ProviderPhase::Boot => BootProviders::NAME,
                },
                source,
            })?
    } else {
        ServiceProviders::default()
    };

    for provider in providers.iter() {
        let result = match phase {
            ProviderPhase::Register => provider.register(container),
            ProviderPhase::Boot => provider.boot(container),
        };
        result.map_err(|source| BootstrapError::Provider {
            provider: provider.name().to_owned(),
            phase,
            source,
        })?;
        tracing::debug!(
            target: BOOTSTRAP_TARGET,
            provider = provider.name(),
            %phase,
            "service provider finished"
        );
    }
    Ok(())
}
