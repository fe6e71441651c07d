//! Request-lifecycle kernel for applications embedded in a host CMS.
//!
//! The [`Kernel`] bootstraps an application [`Container`] once, sends each
//! inbound [`Request`] through an ordered middleware [`Pipeline`], dispatches
//! it to a [`Router`], and normalizes every failure into a well-defined
//! [`Response`]. When no route matches, or application code raises a
//! not-found failure, the response is marked host-owned and the host runtime
//! finishes the request with its own dispatch.
//!
//! After a response has been sent, [`Kernel::terminate`] runs middleware
//! teardown hooks and returns a [`Termination`] telling the host adapter
//! whether to end the process.
//!
//! Bootstrap progress is surfaced through [`HealthReporter`], failures
//! through the pluggable [`ExceptionHandler`], and everything else through
//! `tracing` events under the `lodger::*` targets.

mod bootstrap;
mod container;
mod exceptions;
mod health;
mod host;
mod http;
mod kernel;
mod pipeline;
mod routing;
mod shim;
mod telemetry;

pub use bootstrap::{
    BindHostAdapters, BootProviders, BootstrapError, BootstrapSequence, BootstrapStep,
    ConfigLoader, Environment, HandleExceptions, LoadConfiguration, LoadEnvironment,
    ProviderError, ProviderPhase, RegisterProviders, ServiceProvider, ServiceProviders,
    StaticConfigLoader, SystemConfigLoader,
};
pub use container::{Container, ContainerError};
pub use exceptions::{
    BoxedCause, ExceptionHandler, Failure, FailureKind, StructuredExceptionHandler,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use host::{HostContext, HostError, Termination};
pub use http::{
    Deferral, Headers, METHOD_OVERRIDE_FIELD, METHOD_OVERRIDE_HEADER, Method, MethodParseError,
    Parameters, Request, Response,
};
pub use kernel::{Kernel, KernelBuilder};
pub use lodger_config::{Config, LogFormat};
pub use pipeline::{
    Destination, Middleware, MiddlewareRegistry, MiddlewareSpec, MiddlewareSpecError, Next,
    Pipe, Pipeline,
};
pub use routing::{Handler, Route, RouteMatch, RouteOutcome, RouteParameters, RouteTable, Router};
pub use shim::{ShimError, ShimMessage, ShimSummary, serve_jsonl};
pub use telemetry::{
    TelemetryError, TelemetryHandle, initialise as initialise_telemetry,
    install_fallback as install_fallback_telemetry,
};

#[cfg(test)]
mod tests;
