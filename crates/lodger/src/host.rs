//! Host runtime seams: the hook table adapters register against, and the
//! signal telling the adapter how to finish the request.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::container::{Container, ContainerError};

/// Errors raised by host hook callbacks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// A hook callback reported a failure.
    #[error("hook '{hook}' failed: {message}")]
    HookFailed {
        /// Hook being fired.
        hook: String,
        /// Message reported by the callback.
        message: String,
    },
}

impl HostError {
    /// Builds a hook failure.
    #[must_use]
    pub fn hook_failed(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookFailed {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

type HookCallback = Arc<dyn Fn(&str) -> Result<(), HostError> + Send + Sync>;

struct Hook {
    priority: i32,
    callback: HookCallback,
}

#[derive(Default)]
struct HookTable {
    hooks: BTreeMap<String, Vec<Hook>>,
    fired: BTreeMap<String, usize>,
}

/// Hook table standing in for the host's global action registry.
///
/// Cloning shares the same table. Callbacks run in ascending priority;
/// callbacks with equal priority run in registration order.
#[derive(Clone, Default)]
pub struct HostContext {
    table: Arc<RwLock<HookTable>>,
}

impl fmt::Debug for HostContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        formatter
            .debug_struct("HostContext")
            .field("hooks", &table.hooks.keys().collect::<Vec<_>>())
            .field("fired", &table.fired)
            .finish()
    }
}

impl HostContext {
    /// Creates an empty hook table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `hook` at `priority`.
    pub fn register_hook<F>(&self, hook: impl Into<String>, priority: i32, callback: F)
    where
        F: Fn(&str) -> Result<(), HostError> + Send + Sync + 'static,
    {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let entries = table.hooks.entry(hook.into()).or_default();
        let position = entries.partition_point(|existing| existing.priority <= priority);
        entries.insert(
            position,
            Hook {
                priority,
                callback: Arc::new(callback),
            },
        );
    }

    /// Runs every callback registered for `hook`, returning how many ran.
    ///
    /// The table lock is released before callbacks run, so a callback may
    /// register further hooks.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first callback failure.
    pub fn fire(&self, hook: &str) -> Result<usize, HostError> {
        let callbacks: Vec<HookCallback> = {
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            *table.fired.entry(hook.to_owned()).or_default() += 1;
            table
                .hooks
                .get(hook)
                .map(|entries| entries.iter().map(|entry| Arc::clone(&entry.callback)).collect())
                .unwrap_or_default()
        };
        for callback in &callbacks {
            callback(hook)?;
        }
        Ok(callbacks.len())
    }

    /// Number of callbacks registered for `hook`.
    #[must_use]
    pub fn hook_count(&self, hook: &str) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .hooks
            .get(hook)
            .map_or(0, Vec::len)
    }

    /// Number of times `hook` has been fired.
    #[must_use]
    pub fn times_fired(&self, hook: &str) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .fired
            .get(hook)
            .copied()
            .unwrap_or_default()
    }

    /// Drops every registered callback and fire count.
    pub fn flush(&self) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.hooks.clear();
        table.fired.clear();
    }
}

impl Container {
    /// Resolves the bound host context.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::Unresolvable`] before the host adapters
    /// have been bound.
    pub fn host(&self) -> Result<HostContext, ContainerError> {
        self.resolve::<HostContext>()
    }
}

/// How the host adapter should finish after [`crate::Kernel::terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The response was deferred; the host continues its own dispatch.
    DeferredToHost,
    /// Teardown ran and the process should stay alive (test harnesses).
    Complete,
    /// Teardown ran and the host adapter should end the process.
    ExitProcess,
}

impl Termination {
    /// Returns `true` when the adapter should end the process.
    #[must_use]
    pub const fn should_exit(self) -> bool {
        matches!(self, Self::ExitProcess)
    }
}
