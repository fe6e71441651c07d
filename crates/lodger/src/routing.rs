//! Router contract and a small route table.
//!
//! The kernel only needs [`Router::dispatch`]: it returns a
//! [`RouteOutcome`] that is either a handler's response or one of the two
//! "no match" signals. Neither signal is an error. [`RouteTable`] is a
//! template-matching router good enough for wiring and tests; hosts with
//! their own router implement [`Router::resolve`] instead.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::exceptions::Failure;
use crate::http::{Method, Request, Response};
use crate::pipeline::MiddlewareSpec;

/// Values bound to `{name}` placeholders in a route template.
pub type RouteParameters = BTreeMap<String, String>;

/// Route handler.
pub trait Handler: Send + Sync {
    /// Produces the response for a matched route.
    ///
    /// # Errors
    ///
    /// Returns any failure raised by application code.
    fn handle(&self, request: &Request, parameters: &RouteParameters)
    -> Result<Response, Failure>;
}

impl<F> Handler for F
where
    F: Fn(&Request, &RouteParameters) -> Result<Response, Failure> + Send + Sync,
{
    fn handle(
        &self,
        request: &Request,
        parameters: &RouteParameters,
    ) -> Result<Response, Failure> {
        self(request, parameters)
    }
}

/// Result of matching a request against the routing table.
pub enum RouteMatch {
    /// A route accepts both the path and the method.
    Matched {
        /// Handler for the route.
        handler: Arc<dyn Handler>,
        /// Values bound from the path.
        parameters: RouteParameters,
        /// Middleware attached to the route, aliases already expanded.
        middleware: Vec<MiddlewareSpec>,
    },
    /// No route matches the path.
    NoRouteForPath,
    /// The path matches, but not for this method.
    WrongMethod {
        /// Methods the path accepts.
        allowed: BTreeSet<Method>,
    },
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matched {
                parameters,
                middleware,
                ..
            } => formatter
                .debug_struct("Matched")
                .field("parameters", parameters)
                .field("middleware", middleware)
                .finish_non_exhaustive(),
            Self::NoRouteForPath => formatter.write_str("NoRouteForPath"),
            Self::WrongMethod { allowed } => formatter
                .debug_struct("WrongMethod")
                .field("allowed", allowed)
                .finish(),
        }
    }
}

/// Outcome of dispatching a request.
#[derive(Debug)]
pub enum RouteOutcome {
    /// The handler ran and produced a response.
    Matched(Response),
    /// No route matches the path.
    NoRoute,
    /// The path matches, but not for this method.
    MethodNotAllowed {
        /// Methods the path accepts.
        allowed: BTreeSet<Method>,
    },
}

/// Maps requests to handlers.
pub trait Router: Send + Sync {
    /// Matches `request` without running anything.
    fn resolve(&self, request: &Request) -> RouteMatch;

    /// Matches `request` and runs the handler when one accepts it.
    ///
    /// # Errors
    ///
    /// Returns the handler's failure. Missing routes and method mismatches
    /// are reported as [`RouteOutcome`] variants, never as failures.
    fn dispatch(&self, request: &Request) -> Result<RouteOutcome, Failure> {
        match self.resolve(request) {
            RouteMatch::Matched {
                handler,
                parameters,
                ..
            } => handler
                .handle(request, &parameters)
                .map(RouteOutcome::Matched),
            RouteMatch::NoRouteForPath => Ok(RouteOutcome::NoRoute),
            RouteMatch::WrongMethod { allowed } => Ok(RouteOutcome::MethodNotAllowed { allowed }),
        }
    }

    /// Middleware attached to the route that `request` matches.
    fn route_middleware(&self, request: &Request) -> Vec<MiddlewareSpec> {
        match self.resolve(request) {
            RouteMatch::Matched { middleware, .. } => middleware,
            RouteMatch::NoRouteForPath | RouteMatch::WrongMethod { .. } => Vec::new(),
        }
    }

    /// Registers a short alias for a middleware reference. Routers that do
    /// not support route middleware ignore it.
    fn alias_middleware(&mut self, alias: &str, target: &MiddlewareSpec) {
        let _ = (alias, target);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Parameter(String),
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Route registered in a [`RouteTable`].
pub struct Route {
    methods: BTreeSet<Method>,
    template: Vec<Segment>,
    handler: Arc<dyn Handler>,
    middleware: Vec<MiddlewareSpec>,
}

impl fmt::Debug for Route {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Route")
            .field("methods", &self.methods)
            .field("template", &self.template)
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}

impl Route {
    /// Creates a route for `template`, e.g. `/posts/{id}`.
    ///
    /// Registering `GET` also accepts `HEAD`.
    #[must_use]
    pub fn new<H>(methods: impl IntoIterator<Item = Method>, template: &str, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        let mut accepted: BTreeSet<Method> = methods.into_iter().collect();
        if accepted.contains(&Method::Get) {
            accepted.insert(Method::Head);
        }
        Self {
            methods: accepted,
            template: segments(template)
                .map(|segment| {
                    segment
                        .strip_prefix('{')
                        .and_then(|rest| rest.strip_suffix('}'))
                        .map_or_else(
                            || Segment::Literal(segment.to_owned()),
                            |name| Segment::Parameter(name.to_owned()),
                        )
                })
                .collect(),
            handler: Arc::new(handler),
            middleware: Vec::new(),
        }
    }

    /// `GET` route.
    #[must_use]
    pub fn get<H: Handler + 'static>(template: &str, handler: H) -> Self {
        Self::new([Method::Get], template, handler)
    }

    /// `POST` route.
    #[must_use]
    pub fn post<H: Handler + 'static>(template: &str, handler: H) -> Self {
        Self::new([Method::Post], template, handler)
    }

    /// Attaches route middleware.
    #[must_use]
    pub fn with_middleware(mut self, spec: MiddlewareSpec) -> Self {
        self.middleware.push(spec);
        self
    }

    fn bind(&self, path: &str) -> Option<RouteParameters> {
        let mut parameters = RouteParameters::new();
        let mut pieces = segments(path);
        for segment in &self.template {
            let piece = pieces.next()?;
            match segment {
                Segment::Literal(literal) if literal == piece => {}
                Segment::Literal(_) => return None,
                Segment::Parameter(name) => {
                    parameters.insert(name.clone(), piece.to_owned());
                }
            }
        }
        pieces.next().is_none().then_some(parameters)
    }
}

/// Ordered list of routes; the first route whose template and method both
/// match wins.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    aliases: BTreeMap<String, MiddlewareSpec>,
}

impl RouteTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            routes: Vec::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Adds a route, builder style.
    #[must_use]
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Adds a route.
    pub fn add(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Registered aliases.
    #[must_use]
    pub const fn aliases(&self) -> &BTreeMap<String, MiddlewareSpec> {
        &self.aliases
    }

    fn expand(&self, spec: &MiddlewareSpec) -> MiddlewareSpec {
        match self.aliases.get(spec.name()) {
            Some(target) if spec.parameters().is_empty() => target.clone(),
            Some(target) => MiddlewareSpec::new(target.name(), spec.parameters().to_vec()),
            None => spec.clone(),
        }
    }
}

impl Router for RouteTable {
    fn resolve(&self, request: &Request) -> RouteMatch {
        let method = request.method();
        let mut allowed = BTreeSet::new();
        for route in &self.routes {
            let Some(parameters) = route.bind(request.path()) else {
                continue;
            };
            if route.methods.contains(&method) {
                return RouteMatch::Matched {
                    handler: Arc::clone(&route.handler),
                    parameters,
                    middleware: route.middleware.iter().map(|spec| self.expand(spec)).collect(),
                };
            }
            allowed.extend(route.methods.iter().copied());
        }
        if allowed.is_empty() {
            RouteMatch::NoRouteForPath
        } else {
            RouteMatch::WrongMethod { allowed }
        }
    }

    fn alias_middleware(&mut self, alias: &str, target: &MiddlewareSpec) {
        self.aliases.insert(alias.to_owned(), target.clone());
    }
}
