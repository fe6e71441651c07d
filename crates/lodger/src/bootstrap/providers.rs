//! Service providers: the application's hook into bootstrap.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::container::{Container, ContainerError};
use crate::host::HostError;

/// Lifecycle phase of a service provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderPhase {
    /// Binding services into the container.
    Register,
    /// Using services bound by every provider.
    Boot,
}

impl fmt::Display for ProviderPhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Register => "register",
            Self::Boot => "boot",
        })
    }
}

/// Errors reported by service providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A dependency could not be resolved.
    #[error(transparent)]
    Container(#[from] ContainerError),
    /// A host hook failed.
    #[error(transparent)]
    Host(#[from] HostError),
    /// Any other provider failure.
    #[error("{message}")]
    Failed {
        /// Failure description.
        message: String,
    },
}

impl ProviderError {
    /// Builds a generic provider failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Registers and boots a slice of the application.
///
/// Every provider's [`register`](Self::register) runs before any
/// provider's [`boot`](Self::boot), so booting may rely on services bound
/// by other providers.
pub trait ServiceProvider: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Binds services into the container.
    ///
    /// # Errors
    ///
    /// Returns the reason registration failed; bootstrap aborts.
    fn register(&self, container: &Container) -> Result<(), ProviderError>;

    /// Runs once every provider has registered.
    ///
    /// # Errors
    ///
    /// Returns the reason booting failed; bootstrap aborts.
    fn boot(&self, container: &Container) -> Result<(), ProviderError> {
        let _ = container;
        Ok(())
    }
}

/// Ordered providers bound into the container by the kernel builder.
#[derive(Clone, Default)]
pub struct ServiceProviders(Vec<Arc<dyn ServiceProvider>>);

impl fmt::Debug for ServiceProviders {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_list()
            .entries(self.0.iter().map(|provider| provider.name()))
            .finish()
    }
}

impl ServiceProviders {
    /// Wraps an ordered provider list.
    #[must_use]
    pub const fn new(providers: Vec<Arc<dyn ServiceProvider>>) -> Self {
        Self(providers)
    }

    /// Iterates over the providers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ServiceProvider>> {
        self.0.iter()
    }

    /// Number of providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when there are no providers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
