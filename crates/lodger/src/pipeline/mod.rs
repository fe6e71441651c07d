//! Onion-ordered middleware pipeline.
//!
//! [`Pipeline::send`] starts a pass, [`Pipeline::through`] supplies the
//! resolved middleware and [`Pipeline::then`] runs them in order before the
//! final destination. Each middleware receives a [`Next`] continuation it
//! may consume at most once; code after `next.run(..)` returns executes on
//! the way out, so post-processing runs in reverse declaration order.

mod middleware;
mod registry;
mod spec;

use std::sync::Arc;

pub use middleware::Middleware;
pub use registry::MiddlewareRegistry;
pub use spec::{MiddlewareSpec, MiddlewareSpecError};

use crate::exceptions::Failure;
use crate::http::{Request, Response};

const PIPELINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::pipeline");

/// Final handler reached when every middleware has called `next`.
pub type Destination<'a> = dyn Fn(Request) -> Result<Response, Failure> + 'a;

/// A resolved middleware together with the spec it was resolved from.
#[derive(Clone)]
pub struct Pipe {
    spec: MiddlewareSpec,
    middleware: Arc<dyn Middleware>,
}

impl Pipe {
    /// Pairs a spec with its implementation.
    #[must_use]
    pub fn new(spec: MiddlewareSpec, middleware: Arc<dyn Middleware>) -> Self {
        Self { spec, middleware }
    }

    /// Registered middleware name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Parameters parsed from the spec.
    #[must_use]
    pub fn parameters(&self) -> &[String] {
        self.spec.parameters()
    }

    /// Middleware implementation.
    #[must_use]
    pub fn middleware(&self) -> &Arc<dyn Middleware> {
        &self.middleware
    }
}

impl std::fmt::Debug for Pipe {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Pipe")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Continuation handed to each middleware.
///
/// Running it consumes it, so a middleware can forward the request at most
/// once.
pub struct Next<'a> {
    pipes: &'a [Pipe],
    destination: &'a Destination<'a>,
}

impl<'a> Next<'a> {
    const fn new(pipes: &'a [Pipe], destination: &'a Destination<'a>) -> Self {
        Self { pipes, destination }
    }

    /// Passes `request` to the rest of the pipeline.
    ///
    /// # Errors
    ///
    /// Propagates whatever failure the remaining middleware or the
    /// destination raise.
    pub fn run(self, request: Request) -> Result<Response, Failure> {
        match self.pipes.split_first() {
            Some((pipe, rest)) => {
                tracing::trace!(
                    target: PIPELINE_TARGET,
                    middleware = pipe.name(),
                    path = request.path(),
                    "entering middleware"
                );
                pipe.middleware.process(
                    request,
                    Next::new(rest, self.destination),
                    pipe.parameters(),
                )
            }
            None => (self.destination)(request),
        }
    }

    /// Number of middleware still ahead of the destination.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.pipes.len()
    }
}

/// Builder for a single pass through the middleware stack.
#[derive(Debug)]
pub struct Pipeline {
    request: Request,
    pipes: Vec<Pipe>,
}

impl Pipeline {
    /// Starts a pass carrying `request`.
    #[must_use]
    pub const fn send(request: Request) -> Self {
        Self {
            request,
            pipes: Vec::new(),
        }
    }

    /// Sets the middleware to run, in declaration order.
    #[must_use]
    pub fn through(mut self, pipes: impl IntoIterator<Item = Pipe>) -> Self {
        self.pipes = pipes.into_iter().collect();
        self
    }

    /// Runs the middleware and then `destination`.
    ///
    /// # Errors
    ///
    /// Returns the first failure raised by a middleware or the destination.
    pub fn then<F>(self, destination: F) -> Result<Response, Failure>
    where
        F: Fn(Request) -> Result<Response, Failure>,
    {
        let Self { request, pipes } = self;
        Next::new(&pipes, &destination).run(request)
    }
}
