//! The request kernel.
//!
//! [`Kernel::handle`] drives one request through its lifecycle:
//!
//! ```text
//! Bootstrapping -> Piping -> Dispatching -> {Success | Deferred | Errored}
//! ```
//!
//! and [`Kernel::terminate`] runs middleware teardown afterwards unless the
//! response was handed back to the host. Failures never escape `handle`
//! except a bootstrap failure, which is returned as-is.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use lodger_config::Config;

use crate::bootstrap::{
    BootstrapError, BootstrapSequence, ConfigLoader, ServiceProvider, ServiceProviders,
    SystemConfigLoader,
};
use crate::container::Container;
use crate::exceptions::{ExceptionHandler, Failure, StructuredExceptionHandler};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::host::Termination;
use crate::http::{Deferral, Request, Response};
use crate::pipeline::{Middleware, MiddlewareRegistry, MiddlewareSpec, MiddlewareSpecError, Pipeline};
use crate::routing::{RouteOutcome, Router};

const KERNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::kernel");

/// Lifecycle phase, recorded in debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Bootstrapping,
    Piping,
    Dispatching,
    Success,
    Deferred,
    Errored,
    Terminating,
    Done,
}

fn enter(phase: Phase, request: &Request) {
    tracing::debug!(
        target: KERNEL_TARGET,
        ?phase,
        method = %request.method(),
        path = request.path(),
        "request phase"
    );
}

/// Builder for [`Kernel`].
pub struct KernelBuilder<R> {
    router: R,
    container: Arc<Container>,
    loader: Arc<dyn ConfigLoader>,
    reporter: Arc<dyn HealthReporter>,
    bootstrap: Option<BootstrapSequence>,
    registry: MiddlewareRegistry,
    middleware: Vec<String>,
    route_middleware: Vec<(String, String)>,
    providers: Vec<Arc<dyn ServiceProvider>>,
    exception_handler: Option<Arc<dyn ExceptionHandler>>,
}

impl<R: fmt::Debug> fmt::Debug for KernelBuilder<R> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("KernelBuilder")
            .field("router", &self.router)
            .field("registry", &self.registry)
            .field("middleware", &self.middleware)
            .field("route_middleware", &self.route_middleware)
            .finish_non_exhaustive()
    }
}

impl<R> KernelBuilder<R>
where
    R: Router,
{
    fn new(router: R) -> Self {
        Self {
            router,
            container: Arc::new(Container::new()),
            loader: Arc::new(SystemConfigLoader),
            reporter: Arc::new(StructuredHealthReporter::new()),
            bootstrap: None,
            registry: MiddlewareRegistry::new(),
            middleware: Vec::new(),
            route_middleware: Vec::new(),
            providers: Vec::new(),
            exception_handler: None,
        }
    }

    /// Shares an existing container instead of creating a fresh one.
    #[must_use]
    pub fn container(mut self, container: Arc<Container>) -> Self {
        self.container = container;
        self
    }

    /// Replaces the configuration loader used by the standard sequence.
    #[must_use]
    pub fn config_loader<L>(mut self, loader: L) -> Self
    where
        L: ConfigLoader + 'static,
    {
        self.loader = Arc::new(loader);
        self
    }

    /// Replaces the health reporter used by the standard sequence.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replaces the standard bootstrap sequence entirely.
    #[must_use]
    pub fn bootstrap_with(mut self, sequence: BootstrapSequence) -> Self {
        self.bootstrap = Some(sequence);
        self
    }

    /// Makes `middleware` resolvable under `name`.
    #[must_use]
    pub fn register_middleware(
        mut self,
        name: impl Into<String>,
        middleware: Arc<dyn Middleware>,
    ) -> Self {
        self.registry.register(name, middleware);
        self
    }

    /// Appends a global middleware reference such as `throttle:60,1`.
    #[must_use]
    pub fn middleware(mut self, spec: impl Into<String>) -> Self {
        self.middleware.push(spec.into());
        self
    }

    /// Declares a route middleware alias handed to the router.
    #[must_use]
    pub fn route_middleware(mut self, alias: impl Into<String>, spec: impl Into<String>) -> Self {
        self.route_middleware.push((alias.into(), spec.into()));
        self
    }

    /// Appends a service provider.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn ServiceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Binds a custom exception handler in place of the default one.
    #[must_use]
    pub fn exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    /// Finishes construction.
    ///
    /// # Errors
    ///
    /// Returns [`MiddlewareSpecError`] when a global or route middleware
    /// reference cannot be parsed.
    pub fn build(self) -> Result<Kernel<R>, MiddlewareSpecError> {
        let Self {
            mut router,
            container,
            loader,
            reporter,
            bootstrap,
            registry,
            middleware,
            route_middleware,
            providers,
            exception_handler,
        } = self;

        let global = middleware
            .iter()
            .map(|raw| MiddlewareSpec::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut aliases = BTreeMap::new();
        for (alias, raw) in &route_middleware {
            let spec = MiddlewareSpec::parse(raw)?;
            router.alias_middleware(alias, &spec);
            aliases.insert(alias.clone(), spec);
        }

        if !providers.is_empty() {
            container.instance(ServiceProviders::new(providers));
        }
        if let Some(handler) = exception_handler {
            container.instance(handler);
        }

        Ok(Kernel {
            bootstrap: bootstrap.unwrap_or_else(|| BootstrapSequence::standard(loader, reporter)),
            container,
            router,
            registry,
            middleware: global,
            aliases,
        })
    }
}

/// Orchestrates bootstrap, middleware, routing and failure handling.
pub struct Kernel<R> {
    container: Arc<Container>,
    router: R,
    bootstrap: BootstrapSequence,
    registry: MiddlewareRegistry,
    middleware: Vec<MiddlewareSpec>,
    aliases: BTreeMap<String, MiddlewareSpec>,
}

impl<R: fmt::Debug> fmt::Debug for Kernel<R> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Kernel")
            .field("router", &self.router)
            .field("bootstrap", &self.bootstrap)
            .field("middleware", &self.middleware)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

impl<R> Kernel<R>
where
    R: Router,
{
    /// Starts building a kernel around `router`.
    #[must_use]
    pub fn builder(router: R) -> KernelBuilder<R> {
        KernelBuilder::new(router)
    }

    /// Shared application container.
    #[must_use]
    pub const fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Router the kernel dispatches to.
    #[must_use]
    pub const fn router(&self) -> &R {
        &self.router
    }

    /// Global middleware, in pipeline order.
    #[must_use]
    pub fn middleware(&self) -> &[MiddlewareSpec] {
        &self.middleware
    }

    /// Route middleware aliases registered with the router.
    #[must_use]
    pub const fn route_middleware_aliases(&self) -> &BTreeMap<String, MiddlewareSpec> {
        &self.aliases
    }

    /// Runs the bootstrap sequence if it has not run yet.
    ///
    /// # Errors
    ///
    /// Returns the (cached) bootstrap failure.
    pub fn bootstrap(&self) -> Result<(), Arc<BootstrapError>> {
        self.bootstrap.run(&self.container)
    }

    /// Returns `true` once bootstrap has run.
    #[must_use]
    pub fn has_been_bootstrapped(&self) -> bool {
        self.bootstrap.has_been_bootstrapped()
    }

    /// Handles one request.
    ///
    /// Not-found failures and router misses come back as host-owned
    /// responses. Every other failure, including a panic inside middleware
    /// or a handler, is reported and rendered by the exception handler.
    ///
    /// # Errors
    ///
    /// Returns the bootstrap failure when the kernel cannot start; no
    /// response is synthesized in that case.
    pub fn handle(&self, mut request: Request) -> Result<Response, Arc<BootstrapError>> {
        request.enable_method_override();
        self.container.instance(request.clone());

        enter(Phase::Bootstrapping, &request);
        if let Err(error) = self.bootstrap() {
            tracing::error!(
                target: KERNEL_TARGET,
                error = %error,
                "request aborted: kernel failed to bootstrap"
            );
            return Err(error);
        }

        let config = self.config();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.send_request_through_router(request.clone(), &config)
        }));

        let rendered = match outcome {
            Ok(Ok(mut response)) => match response.take_exception() {
                Some(failure) => self.render_failure(&request, failure),
                None => response,
            },
            Ok(Err(failure)) => self.render_failure(&request, Arc::new(failure)),
            Err(payload) => {
                self.render_failure(&request, Arc::new(Failure::from_panic(payload.as_ref())))
            }
        };

        let response = filter_out_not_found(rendered);
        let phase = if response.is_host_owned() {
            Phase::Deferred
        } else if response.exception().is_some() {
            Phase::Errored
        } else {
            Phase::Success
        };
        enter(phase, &request);
        Ok(response)
    }

    /// Runs middleware termination hooks for a finished request.
    ///
    /// Host-owned responses skip teardown entirely. Otherwise route
    /// middleware and then global middleware have their
    /// [`Middleware::terminate`] hook called, unless middleware is skipped.
    /// Middleware that cannot be resolved is logged and skipped. Route
    /// middleware is gathered with method override enabled, as in
    /// [`Kernel::handle`].
    #[must_use]
    pub fn terminate(&self, request: &Request, response: &Response) -> Termination {
        if response.is_host_owned() {
            tracing::debug!(
                target: KERNEL_TARGET,
                reason = ?response.deferral(),
                "response deferred to host; skipping teardown"
            );
            return Termination::DeferredToHost;
        }

        let mut overridden = request.clone();
        overridden.enable_method_override();

        enter(Phase::Terminating, &overridden);
        let config = self.config();
        if !config.should_skip_middleware() {
            let specs = self
                .gather_route_middleware(&overridden)
                .into_iter()
                .chain(self.middleware.iter().cloned());
            for spec in specs {
                match self.registry.resolve(&spec) {
                    Ok(pipe) => pipe.middleware().terminate(&overridden, response),
                    Err(failure) => tracing::warn!(
                        target: KERNEL_TARGET,
                        middleware = %spec,
                        error = %failure,
                        "skipping termination hook"
                    ),
                }
            }
        }
        enter(Phase::Done, &overridden);

        if config.is_testing() {
            Termination::Complete
        } else {
            Termination::ExitProcess
        }
    }

    /// Route middleware that applies to `request`.
    #[must_use]
    pub fn gather_route_middleware(&self, request: &Request) -> Vec<MiddlewareSpec> {
        self.router.route_middleware(request)
    }

    fn config(&self) -> Config {
        self.container.resolve::<Config>().unwrap_or_default()
    }

    fn send_request_through_router(
        &self,
        request: Request,
        config: &Config,
    ) -> Result<Response, Failure> {
        enter(Phase::Piping, &request);
        let pipes = if config.should_skip_middleware() {
            Vec::new()
        } else {
            self.registry.resolve_all(&self.middleware)?
        };
        Pipeline::send(request)
            .through(pipes)
            .then(|routed| self.dispatch_to_router(routed, config))
    }

    fn dispatch_to_router(&self, request: Request, config: &Config) -> Result<Response, Failure> {
        enter(Phase::Dispatching, &request);
        self.container.instance(request.clone());
        let pipes = if config.should_skip_middleware() {
            Vec::new()
        } else {
            self.registry
                .resolve_all(&self.gather_route_middleware(&request))?
        };
        Pipeline::send(request).through(pipes).then(|routed| {
            match self.router.dispatch(&routed)? {
                RouteOutcome::Matched(response) => Ok(response),
                RouteOutcome::NoRoute => Ok(Response::defer_to_host(Deferral::NoRoute)),
                RouteOutcome::MethodNotAllowed { allowed } => Ok(Response::defer_to_host(
                    Deferral::MethodNotAllowed { allowed },
                )),
            }
        })
    }

    fn render_failure(&self, request: &Request, failure: Arc<Failure>) -> Response {
        let handler = self.container.exception_handler().unwrap_or_else(|error| {
            tracing::warn!(
                target: KERNEL_TARGET,
                error = %error,
                "no exception handler bound; using the default"
            );
            Arc::new(StructuredExceptionHandler::default())
        });
        handler.report(&failure);
        let response = handler.render(request, Arc::clone(&failure));
        if response.exception().is_some() {
            response
        } else {
            response.with_exception(failure)
        }
    }
}

fn filter_out_not_found(response: Response) -> Response {
    if response
        .exception()
        .is_some_and(|failure| failure.is_not_found())
    {
        Response::defer_to_host(Deferral::NotFoundFailure)
    } else {
        response
    }
}
