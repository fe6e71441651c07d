//! Name-to-implementation table for middleware.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::exceptions::Failure;

use super::{Middleware, MiddlewareSpec, PIPELINE_TARGET, Pipe};

/// Registered middleware keyed by name.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    entries: BTreeMap<String, Arc<dyn Middleware>>,
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MiddlewareRegistry")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MiddlewareRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registers `middleware` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, middleware: Arc<dyn Middleware>) {
        self.entries.insert(name.into(), middleware);
    }

    /// Returns `true` when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered middleware.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a single reference.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::UnknownMiddleware`] for an unregistered name.
    pub fn resolve(&self, spec: &MiddlewareSpec) -> Result<Pipe, Failure> {
        self.entries
            .get(spec.name())
            .map(|middleware| Pipe::new(spec.clone(), Arc::clone(middleware)))
            .ok_or_else(|| {
                tracing::warn!(
                    target: PIPELINE_TARGET,
                    middleware = spec.name(),
                    "middleware is not registered"
                );
                Failure::unknown_middleware(spec.name())
            })
    }

    /// Resolves references in order, stopping at the first unknown name.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::UnknownMiddleware`] for the first unregistered name.
    pub fn resolve_all<'a>(
        &self,
        specs: impl IntoIterator<Item = &'a MiddlewareSpec>,
    ) -> Result<Vec<Pipe>, Failure> {
        specs.into_iter().map(|spec| self.resolve(spec)).collect()
    }
}
