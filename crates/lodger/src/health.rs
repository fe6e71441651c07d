//! Structured health reporting for kernel bootstrap.

use std::sync::Arc;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface bootstrap progress to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the first bootstrap step runs.
    fn bootstrap_starting(&self);

    /// Invoked after each step completes.
    fn step_completed(&self, step: &str);

    /// Invoked once every step has completed.
    fn bootstrap_succeeded(&self, steps: &[&'static str]);

    /// Invoked when a step fails.
    fn bootstrap_failed(&self, error: &BootstrapError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn step_completed(&self, step: &str) {
        (**self).step_completed(step);
    }

    fn bootstrap_succeeded(&self, steps: &[&'static str]) {
        (**self).bootstrap_succeeded(steps);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting kernel bootstrap"
        );
    }

    fn step_completed(&self, step: &str) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "step_completed",
            step,
            "bootstrap step completed"
        );
    }

    fn bootstrap_succeeded(&self, steps: &[&'static str]) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            steps = steps.len(),
            sequence = %steps.join(","),
            "kernel bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            step = error.failed_step(),
            error = %error,
            "kernel bootstrap failed"
        );
    }
}
