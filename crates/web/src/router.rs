//! Route registration storage and its compiled, ready-to-dispatch form.
//!
//! [`RouteTable`] keeps routes per method in registration order.
//! [`CompiledRouteTable`] is derived from it by wrapping every route handler
//! with the global middlewares; it is rebuilt wholesale and never mutated.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;

use crate::chain::{MiddlewareWrapper, Wrapper};
use crate::handler::SharedHandler;
use crate::matcher::PathSpec;
use crate::middleware::SharedMiddleware;
use crate::request::Request;

/// The methods a route can be registered for.
pub const ROUTABLE_METHODS: [Method; 9] = [
    Method::CONNECT,
    Method::DELETE,
    Method::GET,
    Method::HEAD,
    Method::OPTIONS,
    Method::PATCH,
    Method::POST,
    Method::PUT,
    Method::TRACE,
];

/// A matcher and the handler it selects, route-scoped middlewares already applied.
#[derive(Clone)]
pub struct Route {
    matcher: PathSpec,
    handler: SharedHandler,
}

impl Route {
    pub fn new(matcher: PathSpec, handler: SharedHandler) -> Self {
        Self { matcher, handler }
    }

    pub fn matcher(&self) -> &PathSpec {
        &self.matcher
    }

    pub fn handler(&self) -> &SharedHandler {
        &self.handler
    }
}

#[derive(Default, Clone)]
pub struct RouteTable {
    routes: HashMap<Method, Vec<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, method: Method, route: Route) {
        self.routes.entry(method).or_default().push(route);
    }

    pub fn routes(&self, method: &Method) -> &[Route] {
        self.routes.get(method).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct CompiledRouteTable {
    buckets: HashMap<Method, Vec<Route>>,
}

impl CompiledRouteTable {
    /// Wraps every route of `table` with `global_middlewares`, keeping the route order.
    pub fn compile(table: &RouteTable, global_middlewares: &[SharedMiddleware]) -> Self {
        if table.is_empty() {
            return Self::default();
        }

        let wrapper = MiddlewareWrapper::new(global_middlewares);

        let buckets = table
            .routes
            .iter()
            .map(|(method, routes)| {
                let routes = routes
                    .iter()
                    .map(|route| Route::new(route.matcher().clone(), wrapper.wrap(Arc::clone(route.handler()))))
                    .collect::<Vec<_>>();
                (method.clone(), routes)
            })
            .collect();

        Self { buckets }
    }

    /// The handler of the first route of the request's method whose matcher accepts it.
    pub fn find(&self, req: &Request) -> Option<&SharedHandler> {
        self.buckets
            .get(req.method())?
            .iter()
            .find(|route| route.matcher().matches(req))
            .map(Route::handler)
    }

    pub fn routes(&self, method: &Method) -> &[Route] {
        self.buckets.get(method).map_or(&[], Vec::as_slice)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route").field("matcher", &self.matcher).finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable").field("routes", &self.routes).finish()
    }
}

impl std::fmt::Debug for CompiledRouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRouteTable").field("buckets", &self.buckets).finish()
    }
}
