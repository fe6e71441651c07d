//! Typed application container.
//!
//! Services are keyed by their Rust type. A binding is either a ready
//! instance, a singleton factory that runs at most once, or a factory that
//! runs on every resolution. Trait objects are stored behind an `Arc`, so the
//! key for an exception handler is `Arc<dyn ExceptionHandler>`.
//!
//! The binding table lock is never held while a factory runs, so factories
//! may resolve other services from the same container.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::OnceCell;
use thiserror::Error;

type Erased = Arc<dyn Any + Send + Sync>;
type ErasedFactory = Arc<dyn Fn(&Container) -> Result<Erased, ContainerError> + Send + Sync>;

/// Errors raised by container lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// No binding exists for the requested service.
    #[error("service '{service}' cannot be resolved: nothing is bound")]
    Unresolvable {
        /// Type name of the requested service.
        service: &'static str,
    },
    /// A factory reported an error while building the service.
    #[error("factory for service '{service}' failed: {message}")]
    Factory {
        /// Type name of the requested service.
        service: &'static str,
        /// Message reported by the factory.
        message: String,
    },
}

impl ContainerError {
    /// Builds an unresolvable-service error for `T`.
    #[must_use]
    pub fn unresolvable<T: ?Sized>() -> Self {
        Self::Unresolvable {
            service: type_name::<T>(),
        }
    }

    /// Builds a factory error for `T`.
    #[must_use]
    pub fn factory<T: ?Sized>(message: impl Into<String>) -> Self {
        Self::Factory {
            service: type_name::<T>(),
            message: message.into(),
        }
    }
}

#[derive(Clone)]
enum Binding {
    Instance(Erased),
    Singleton {
        factory: ErasedFactory,
        cell: Arc<OnceCell<Erased>>,
    },
    Factory(ErasedFactory),
}

/// Registry mapping service types to instances or factories.
#[derive(Default)]
pub struct Container {
    bindings: RwLock<HashMap<TypeId, Binding>>,
}

impl fmt::Debug for Container {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Container")
            .field("bindings", &self.len())
            .finish()
    }
}

impl Container {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a ready-made instance, replacing any previous binding for `T`.
    pub fn instance<T>(&self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.insert::<T>(Binding::Instance(Arc::new(value)));
    }

    /// Binds a factory whose first successful result is shared by every
    /// later resolution.
    pub fn singleton<T, F>(&self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Self) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.insert::<T>(Binding::Singleton {
            factory: erase(factory),
            cell: Arc::new(OnceCell::new()),
        });
    }

    /// Binds a factory that runs on every resolution.
    pub fn bind<T, F>(&self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Self) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.insert::<T>(Binding::Factory(erase(factory)));
    }

    /// Resolves the service bound for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::Unresolvable`] when nothing is bound for
    /// `T`, or the factory's error when building the service fails.
    pub fn resolve<T>(&self) -> Result<T, ContainerError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let binding = self
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(ContainerError::unresolvable::<T>)?;

        let erased = match binding {
            Binding::Instance(value) => value,
            Binding::Singleton { factory, cell } => cell.get_or_try_init(|| factory(self))?.clone(),
            Binding::Factory(factory) => factory(self)?,
        };

        let any: &(dyn Any + Send + Sync) = &*erased;
        any.downcast_ref::<T>()
            .cloned()
            .ok_or_else(ContainerError::unresolvable::<T>)
    }

    /// Returns `true` when something is bound for `T`.
    #[must_use]
    pub fn has<T: 'static>(&self) -> bool {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<T>())
    }

    /// Removes the binding for `T`, returning whether one existed.
    pub fn forget<T: 'static>(&self) -> bool {
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&TypeId::of::<T>())
            .is_some()
    }

    /// Number of bound services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when no service is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every binding and cached singleton.
    pub fn flush(&self) {
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn insert<T: 'static>(&self, binding: Binding) {
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>(), binding);
    }
}

fn erase<T, F>(factory: F) -> ErasedFactory
where
    T: Send + Sync + 'static,
    F: Fn(&Container) -> Result<T, ContainerError> + Send + Sync + 'static,
{
    Arc::new(move |container: &Container| {
        factory(container).map(|value| Arc::new(value) as Erased)
    })
}
