//! Request failures and the pluggable exception handler.
//!
//! Every failure raised by middleware, the router or a route handler is a
//! [`Failure`]. The kernel normalizes it through [`Failure::kind`]: not-found
//! failures end up deferred to the host, everything else is reported and
//! rendered by the bound [`ExceptionHandler`].

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::container::{Container, ContainerError};
use crate::http::{Request, Response};

const EXCEPTIONS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::exceptions");

/// Boxed error carried as the cause of an unhandled failure.
pub type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

/// Failure raised while handling a request.
#[derive(Debug, Error)]
pub enum Failure {
    /// Application code could not find what the request asked for.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description.
        message: String,
    },
    /// Application code aborted with an explicit HTTP status.
    #[error("http {status}: {message}")]
    Http {
        /// Status code to render.
        status: u16,
        /// Human-readable description.
        message: String,
    },
    /// A middleware name had no registered implementation.
    #[error("middleware '{name}' is not registered")]
    UnknownMiddleware {
        /// Name that failed to resolve.
        name: String,
    },
    /// Resolving a service from the container failed.
    #[error(transparent)]
    Container(#[from] ContainerError),
    /// Any other application error.
    #[error("{message}")]
    Unhandled {
        /// Human-readable description.
        message: String,
        /// Underlying cause, when one exists.
        #[source]
        source: Option<BoxedCause>,
    },
    /// A middleware or handler panicked.
    #[error("fatal error: {message}")]
    Fatal {
        /// Panic payload rendered as text.
        message: String,
    },
}

/// Normalized classification used by the kernel's dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Deferred to the host after reporting.
    NotFound,
    /// Reported and rendered.
    Unhandled,
    /// Reported and rendered as a server error.
    Fatal,
}

impl Failure {
    /// Builds a not-found failure.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Builds a failure with an explicit status code.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Builds an unhandled failure without a cause.
    #[must_use]
    pub fn unhandled(message: impl Into<String>) -> Self {
        Self::Unhandled {
            message: message.into(),
            source: None,
        }
    }

    /// Builds an unhandled failure wrapping `cause`.
    #[must_use]
    pub fn with_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Unhandled {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Builds a failure for an unregistered middleware name.
    #[must_use]
    pub fn unknown_middleware(name: impl Into<String>) -> Self {
        Self::UnknownMiddleware { name: name.into() }
    }

    /// Converts a panic payload into a fatal failure.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| (*text).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with a non-string payload".to_owned());
        Self::Fatal { message }
    }

    /// Normalized kind. An HTTP 404 counts as not found.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound { .. } | Self::Http { status: 404, .. } => FailureKind::NotFound,
            Self::Fatal { .. } => FailureKind::Fatal,
            Self::Http { .. }
            | Self::UnknownMiddleware { .. }
            | Self::Container(_)
            | Self::Unhandled { .. } => FailureKind::Unhandled,
        }
    }

    /// Returns `true` when the failure normalizes to not found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == FailureKind::NotFound
    }

    /// Status code used when rendering the failure.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Http { status, .. } => *status,
            Self::UnknownMiddleware { .. }
            | Self::Container(_)
            | Self::Unhandled { .. }
            | Self::Fatal { .. } => 500,
        }
    }
}

/// Reports and renders failures that escape the middleware pipeline.
///
/// The kernel calls [`report`](Self::report) exactly once and then
/// [`render`](Self::render) exactly once for every errored request.
pub trait ExceptionHandler: Send + Sync {
    /// Records the failure for observability.
    fn report(&self, failure: &Failure);

    /// Turns the failure into a response. The returned response should carry
    /// the failure through [`Response::with_exception`].
    fn render(&self, request: &Request, failure: Arc<Failure>) -> Response;
}

impl<T> ExceptionHandler for Arc<T>
where
    T: ExceptionHandler + ?Sized,
{
    fn report(&self, failure: &Failure) {
        (**self).report(failure);
    }

    fn render(&self, request: &Request, failure: Arc<Failure>) -> Response {
        (**self).render(request, failure)
    }
}

/// Default handler: logs through `tracing` and renders plain text or JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredExceptionHandler {
    expose_errors: bool,
}

impl StructuredExceptionHandler {
    /// Builds a handler. With `expose_errors` set, rendered bodies include
    /// the failure message instead of a generic status phrase.
    #[must_use]
    pub const fn new(expose_errors: bool) -> Self {
        Self { expose_errors }
    }

    fn message_for(&self, failure: &Failure) -> String {
        if self.expose_errors {
            return failure.to_string();
        }
        match failure.status() {
            404 => "Not Found".to_owned(),
            405 => "Method Not Allowed".to_owned(),
            status if status >= 500 => "Server Error".to_owned(),
            _ => "Request Error".to_owned(),
        }
    }
}

impl ExceptionHandler for StructuredExceptionHandler {
    fn report(&self, failure: &Failure) {
        match failure.kind() {
            FailureKind::NotFound => tracing::info!(
                target: EXCEPTIONS_TARGET,
                event = "failure_reported",
                status = failure.status(),
                error = %failure,
                "request raised not-found"
            ),
            FailureKind::Unhandled | FailureKind::Fatal => tracing::error!(
                target: EXCEPTIONS_TARGET,
                event = "failure_reported",
                kind = ?failure.kind(),
                status = failure.status(),
                error = %failure,
                "request failed"
            ),
        }
    }

    fn render(&self, request: &Request, failure: Arc<Failure>) -> Response {
        let message = self.message_for(&failure);
        let response = if request.wants_json() {
            Response::new(failure.status(), json!({ "error": message }).to_string())
                .with_header("content-type", "application/json")
        } else {
            Response::new(failure.status(), message)
                .with_header("content-type", "text/plain; charset=utf-8")
        };
        response.with_exception(failure)
    }
}

impl Container {
    /// Resolves the bound exception handler.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::Unresolvable`] when no handler is bound.
    pub fn exception_handler(&self) -> Result<Arc<dyn ExceptionHandler>, ContainerError> {
        self.resolve::<Arc<dyn ExceptionHandler>>()
    }
}
