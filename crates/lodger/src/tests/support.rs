//! Recording collaborators and the scenario world shared by the suites.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::bootstrap::{
    BootstrapError, BootstrapSequence, BootstrapStep, ProviderError, ServiceProvider,
    StaticConfigLoader,
};
use crate::container::Container;
use crate::exceptions::{ExceptionHandler, Failure};
use crate::health::HealthReporter;
use crate::host::Termination;
use crate::http::{Method, Request, Response};
use crate::kernel::{Kernel, KernelBuilder};
use crate::pipeline::{Middleware, MiddlewareSpec, Next};
use crate::routing::{Handler, RouteMatch, RouteParameters, Router};
use lodger_config::Config;

/// Ordered log of everything the collaborators observed.
#[derive(Debug, Default)]
pub struct Journal(Mutex<Vec<String>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }
}

/// Middleware that records entry, exit and termination.
pub struct RecordingMiddleware {
    label: String,
    journal: Arc<Journal>,
}

impl RecordingMiddleware {
    pub fn new(label: &str, journal: &Arc<Journal>) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_owned(),
            journal: Arc::clone(journal),
        })
    }
}

impl Middleware for RecordingMiddleware {
    fn process(
        &self,
        request: Request,
        next: Next<'_>,
        parameters: &[String],
    ) -> Result<Response, Failure> {
        if parameters.is_empty() {
            self.journal.record(format!("before:{}", self.label));
        } else {
            self.journal
                .record(format!("before:{}:{}", self.label, parameters.join(",")));
        }
        let response = next.run(request)?;
        self.journal.record(format!("after:{}", self.label));
        Ok(response)
    }

    fn terminate(&self, _request: &Request, response: &Response) {
        self.journal
            .record(format!("terminate:{}:{}", self.label, response.status()));
    }
}

/// Middleware that answers without calling `next`.
pub struct ShortCircuit {
    journal: Arc<Journal>,
}

impl ShortCircuit {
    pub fn new(journal: &Arc<Journal>) -> Arc<Self> {
        Arc::new(Self {
            journal: Arc::clone(journal),
        })
    }
}

impl Middleware for ShortCircuit {
    fn process(
        &self,
        _request: Request,
        _next: Next<'_>,
        _parameters: &[String],
    ) -> Result<Response, Failure> {
        self.journal.record("short-circuit");
        Ok(Response::new(403, "blocked by middleware"))
    }
}

/// Middleware that fails or panics before reaching the router.
pub struct Exploding {
    panics: bool,
}

impl Exploding {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self { panics: false })
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self { panics: true })
    }
}

impl Middleware for Exploding {
    fn process(
        &self,
        _request: Request,
        _next: Next<'_>,
        _parameters: &[String],
    ) -> Result<Response, Failure> {
        if self.panics {
            panic!("middleware exploded");
        }
        Err(Failure::unhandled("middleware refused the request"))
    }
}

/// What the scripted router does for every request.
#[derive(Debug, Clone)]
pub enum Script {
    Respond(String),
    NoRoute,
    WrongMethod(BTreeSet<Method>),
    Fail(String),
    NotFound,
    Http404,
    Panic,
    RespondWithException,
}

/// Router whose single route behaves according to a [`Script`].
#[derive(Debug)]
pub struct ScriptedRouter {
    script: Script,
    journal: Arc<Journal>,
    route_middleware: Vec<String>,
    aliases: BTreeMap<String, MiddlewareSpec>,
    dispatches: Arc<AtomicUsize>,
}

impl ScriptedRouter {
    pub fn new(script: Script, journal: &Arc<Journal>) -> Self {
        Self {
            script,
            journal: Arc::clone(journal),
            route_middleware: Vec::new(),
            aliases: BTreeMap::new(),
            dispatches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_route_middleware(mut self, spec: &str) -> Self {
        self.route_middleware.push(spec.to_owned());
        self
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    fn handler(&self) -> Arc<dyn Handler> {
        let script = self.script.clone();
        let journal = Arc::clone(&self.journal);
        let dispatches = Arc::clone(&self.dispatches);
        Arc::new(
            move |request: &Request, _: &RouteParameters| -> Result<Response, Failure> {
                dispatches.fetch_add(1, Ordering::SeqCst);
                journal.record(format!("router:{}", request.method()));
                match &script {
                    Script::Respond(body) => Ok(Response::ok(body.clone())),
                    Script::Fail(message) => Err(Failure::unhandled(message.clone())),
                    Script::NotFound => Err(Failure::not_found("post does not exist")),
                    Script::Http404 => Err(Failure::http(404, "gone")),
                    Script::Panic => panic!("handler exploded"),
                    Script::RespondWithException => Ok(Response::ok("partial")
                        .with_exception(Arc::new(Failure::unhandled("attached failure")))),
                    Script::NoRoute | Script::WrongMethod(_) => {
                        Err(Failure::unhandled("unreachable script"))
                    }
                }
            },
        )
    }
}

impl Router for ScriptedRouter {
    fn resolve(&self, _request: &Request) -> RouteMatch {
        match &self.script {
            Script::NoRoute => RouteMatch::NoRouteForPath,
            Script::WrongMethod(allowed) => RouteMatch::WrongMethod {
                allowed: allowed.clone(),
            },
            _ => RouteMatch::Matched {
                handler: self.handler(),
                parameters: RouteParameters::new(),
                middleware: self
                    .route_middleware
                    .iter()
                    .filter_map(|raw| raw.parse::<MiddlewareSpec>().ok())
                    .map(|spec| {
                        self.aliases
                            .get(spec.name())
                            .cloned()
                            .unwrap_or(spec)
                    })
                    .collect(),
            },
        }
    }

    fn alias_middleware(&mut self, alias: &str, target: &MiddlewareSpec) {
        self.aliases.insert(alias.to_owned(), target.clone());
    }
}

/// Exception handler that records report and render calls.
pub struct RecordingExceptionHandler {
    journal: Arc<Journal>,
}

impl RecordingExceptionHandler {
    pub fn new(journal: &Arc<Journal>) -> Arc<Self> {
        Arc::new(Self {
            journal: Arc::clone(journal),
        })
    }
}

impl ExceptionHandler for RecordingExceptionHandler {
    fn report(&self, failure: &Failure) {
        self.journal.record(format!("report:{failure}"));
    }

    fn render(&self, _request: &Request, failure: Arc<Failure>) -> Response {
        self.journal.record("render");
        Response::new(failure.status(), format!("rendered: {failure}")).with_exception(failure)
    }
}

/// Health event captured by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    StepCompleted(String),
    BootstrapSucceeded(Vec<String>),
    BootstrapFailed(String),
}

/// Reporter that stores every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, event: HealthEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.push(HealthEvent::BootstrapStarting);
    }

    fn step_completed(&self, step: &str) {
        self.push(HealthEvent::StepCompleted(step.to_owned()));
    }

    fn bootstrap_succeeded(&self, steps: &[&'static str]) {
        self.push(HealthEvent::BootstrapSucceeded(
            steps.iter().map(|step| (*step).to_owned()).collect(),
        ));
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.push(HealthEvent::BootstrapFailed(error.failed_step().to_owned()));
    }
}

/// Step that counts its runs.
pub struct CountingStep {
    name: &'static str,
    runs: Arc<AtomicUsize>,
}

impl CountingStep {
    pub fn new(name: &'static str, runs: &Arc<AtomicUsize>) -> Self {
        Self {
            name,
            runs: Arc::clone(runs),
        }
    }
}

impl BootstrapStep for CountingStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self, _container: &Container) -> Result<(), BootstrapError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Step that always fails and counts its attempts.
pub struct FailingStep {
    runs: Arc<AtomicUsize>,
}

impl FailingStep {
    pub const NAME: &'static str = "failing-step";

    pub fn new(runs: &Arc<AtomicUsize>) -> Self {
        Self {
            runs: Arc::clone(runs),
        }
    }
}

impl BootstrapStep for FailingStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, _container: &Container) -> Result<(), BootstrapError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Err(BootstrapError::step(Self::NAME, "intentional test failure"))
    }
}

/// Provider that records its lifecycle and binds a marker service.
pub struct RecordingProvider {
    name: String,
    journal: Arc<Journal>,
    fail_boot: bool,
}

/// Service bound by [`RecordingProvider::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker(pub String);

impl RecordingProvider {
    pub fn new(name: &str, journal: &Arc<Journal>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            journal: Arc::clone(journal),
            fail_boot: false,
        })
    }

    pub fn failing_boot(name: &str, journal: &Arc<Journal>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            journal: Arc::clone(journal),
            fail_boot: true,
        })
    }
}

impl ServiceProvider for RecordingProvider {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn register(&self, container: &Container) -> Result<(), ProviderError> {
        self.journal.record(format!("register:{}", self.name));
        container.instance(Marker(self.name.clone()));
        Ok(())
    }

    fn boot(&self, container: &Container) -> Result<(), ProviderError> {
        if self.fail_boot {
            return Err(ProviderError::failed("boot refused"));
        }
        let marker = container.resolve::<Marker>()?;
        let host = container.host()?;
        host.register_hook("init", 10, |_| Ok(()));
        self.journal
            .record(format!("boot:{}:saw:{}", self.name, marker.0));
        Ok(())
    }
}

/// Kernel builder preloaded with the recording collaborators.
///
/// Registers `a`, `b` and `c` as recording middleware, `gate` as a
/// short-circuit, and binds a recording exception handler.
pub fn builder(router: ScriptedRouter, journal: &Arc<Journal>, config: Config) -> KernelBuilder<ScriptedRouter> {
    Kernel::builder(router)
        .config_loader(StaticConfigLoader::new(config))
        .register_middleware("a", RecordingMiddleware::new("a", journal))
        .register_middleware("b", RecordingMiddleware::new("b", journal))
        .register_middleware("c", RecordingMiddleware::new("c", journal))
        .register_middleware("gate", ShortCircuit::new(journal))
        .register_middleware("fails", Exploding::failing())
        .register_middleware("panics", Exploding::panicking())
        .exception_handler(RecordingExceptionHandler::new(journal))
}

/// Builds a bootstrap sequence with a single counting step.
pub fn counting_sequence(
    runs: &Arc<AtomicUsize>,
    reporter: Arc<RecordingHealthReporter>,
) -> BootstrapSequence {
    BootstrapSequence::new(reporter).with_step(CountingStep::new("count", runs))
}

/// Scenario world for the request lifecycle behaviour suite.
pub struct TestWorld {
    pub journal: Arc<Journal>,
    script: Script,
    middleware: Vec<String>,
    config: Config,
    kernel: Option<Kernel<ScriptedRouter>>,
    pub request: Request,
    pub response: Option<Response>,
    pub termination: Option<Termination>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            journal: Arc::new(Journal::default()),
            script: Script::Respond("hello".to_owned()),
            middleware: Vec::new(),
            config: Config::for_testing(),
            kernel: None,
            request: Request::get("/hello"),
            response: None,
            termination: None,
        }
    }

    pub fn set_script(&mut self, script: Script) {
        self.script = script;
        self.kernel = None;
    }

    pub fn add_middleware(&mut self, spec: &str) {
        self.middleware.push(spec.to_owned());
        self.kernel = None;
    }

    pub fn set_config(&mut self, config: Config) {
        self.config = config;
        self.kernel = None;
    }

    fn kernel(&mut self) -> Result<&Kernel<ScriptedRouter>, String> {
        if self.kernel.is_none() {
            let router = ScriptedRouter::new(self.script.clone(), &self.journal);
            let mut builder = builder(router, &self.journal, self.config.clone());
            for spec in &self.middleware {
                builder = builder.middleware(spec.clone());
            }
            self.kernel = Some(builder.build().map_err(|error| error.to_string())?);
        }
        self.kernel
            .as_ref()
            .ok_or_else(|| "kernel missing".to_owned())
    }

    pub fn handle(&mut self) -> Result<(), String> {
        let request = self.request.clone();
        let response = self
            .kernel()?
            .handle(request)
            .map_err(|error| error.to_string())?;
        self.response = Some(response);
        Ok(())
    }

    pub fn terminate(&mut self) -> Result<(), String> {
        let request = self.request.clone();
        let response = self
            .response
            .clone()
            .ok_or_else(|| "no response to terminate".to_owned())?;
        let termination = self.kernel()?.terminate(&request, &response);
        self.termination = Some(termination);
        Ok(())
    }

    pub fn response(&self) -> Result<&Response, String> {
        self.response
            .as_ref()
            .ok_or_else(|| "no response recorded".to_owned())
    }
}
