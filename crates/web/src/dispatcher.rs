//! The request entry point.
//!
//! A dispatch loads the current compiled table, runs the first matching route
//! (or the not-found handler) and hands any failure to the error handler.
//! Registration changes swap in a new compiled table, so a dispatch sees the
//! table either entirely before or entirely after a change.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use micro_dispatch_http::connection::ResponseWriter;
use micro_dispatch_http::handler::Handler;
use tracing::{debug, trace};

use crate::error::BoxError;
use crate::handler::{ErrorHandler, LogAndRespond, NotFound, RequestHandler};
use crate::middleware::SharedMiddleware;
use crate::request::Request;
use crate::response::Response;
use crate::router::{CompiledRouteTable, Route, RouteTable};

/// Everything a server instance registers, shared with the connections it serves.
pub(crate) struct ServerState {
    registry: Mutex<Registry>,
    compiled: ArcSwap<CompiledRouteTable>,
    error_handler: ArcSwap<Box<dyn ErrorHandler>>,
    not_found_handler: ArcSwap<Box<dyn RequestHandler>>,
}

#[derive(Default)]
struct Registry {
    routes: RouteTable,
    global_middlewares: Vec<SharedMiddleware>,
}

impl ServerState {
    pub(crate) fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            compiled: ArcSwap::from_pointee(CompiledRouteTable::default()),
            error_handler: ArcSwap::from_pointee(Box::new(LogAndRespond) as Box<dyn ErrorHandler>),
            not_found_handler: ArcSwap::from_pointee(Box::new(NotFound) as Box<dyn RequestHandler>),
        }
    }

    pub(crate) fn add_route(&self, method: Method, route: Route) {
        let mut registry = self.registry();
        registry.routes.push(method, route);
        self.recompile(&registry);
    }

    pub(crate) fn add_global_middlewares(&self, middlewares: impl IntoIterator<Item = SharedMiddleware>) {
        let mut registry = self.registry();
        registry.global_middlewares.extend(middlewares);
        self.recompile(&registry);
    }

    pub(crate) fn set_error_handler(&self, handler: Box<dyn ErrorHandler>) {
        self.error_handler.store(Arc::new(handler));
    }

    pub(crate) fn set_not_found_handler(&self, handler: Box<dyn RequestHandler>) {
        self.not_found_handler.store(Arc::new(handler));
    }

    pub(crate) fn route_count(&self) -> usize {
        self.registry().routes.len()
    }

    // stored while the registry lock is held, so concurrent registrations can't publish out of order
    fn recompile(&self, registry: &Registry) {
        let compiled = CompiledRouteTable::compile(&registry.routes, &registry.global_middlewares);
        self.compiled.store(Arc::new(compiled));
        debug!(routes = registry.routes.len(), global_middlewares = registry.global_middlewares.len(), "route table compiled");
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serves requests against a server's routes.
///
/// It implements the transport [`Handler`], so it can drive any
/// [`HttpConnection`](micro_dispatch_http::connection::HttpConnection).
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<ServerState>,
}

impl Dispatcher {
    pub(crate) fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    /// Dispatches one request.
    ///
    /// The error handler runs at most once, with the first failure the chain
    /// raised. Returns `Err` only when the error handler itself fails.
    pub async fn dispatch(&self, req: Request, res: Response) -> Result<(), BoxError> {
        let compiled = self.state.compiled.load_full();

        let outcome = match compiled.find(&req) {
            Some(handler) => handler.invoke(req.clone(), res.clone()).await,
            None => {
                trace!(method = %req.method(), path = req.path(), "no route matched");
                let not_found_handler = self.state.not_found_handler.load_full();
                not_found_handler.invoke(req.clone(), res.clone()).await
            }
        };

        // a failure kept by the chain wins over whatever its outer stages returned
        match res.take_failure().or(outcome.err()) {
            None => Ok(()),
            Some(e) => {
                let error_handler = self.state.error_handler.load_full();
                error_handler.handle(e, req, res).await
            }
        }
    }
}

#[async_trait]
impl Handler for Dispatcher {
    async fn call(&self, req: http::Request<Bytes>, resp: ResponseWriter) -> Result<(), BoxError> {
        self.dispatch(Request::from(req), Response::from(resp)).await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("routes", &self.state.route_count()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{error_handler_fn, handler_fn, MockErrorHandler};
    use crate::matcher::PathSpec;
    use crate::middleware::{middleware_fn, Next};
    use crate::test_util::{capture, request};
    use http::StatusCode;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state_with(path: &'static str, handler: impl RequestHandler + 'static) -> Arc<ServerState> {
        let state = Arc::new(ServerState::new());
        state.add_route(Method::GET, Route::new(PathSpec::from(path), Arc::new(handler)));
        state
    }

    #[tokio::test]
    async fn unmatched_request_gets_default_404() {
        let dispatcher = Dispatcher::new(Arc::new(ServerState::new()));

        let (res, output) = capture();
        dispatcher.dispatch(request(Method::GET, "/nowhere"), res).await.unwrap();

        assert!(output.text().await.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn handler_failure_reaches_error_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let state = {
            let calls = Arc::clone(&calls);
            state_with(
                "/fail",
                handler_fn(move |_req: Request, _res: Response| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(io::Error::other("broken")) }
                }),
            )
        };

        let mut error_handler = MockErrorHandler::new();
        error_handler
            .expect_handle()
            .withf(|error, req, _res| error.to_string() == "broken" && req.path() == "/fail")
            .times(1)
            .returning(|_, _, _| Ok(()));
        state.set_error_handler(Box::new(error_handler));

        let dispatcher = Dispatcher::new(state);
        let (res, _output) = capture();
        dispatcher.dispatch(request(Method::GET, "/fail"), res).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_middleware_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let state = {
            let calls = Arc::clone(&calls);
            state_with(
                "/",
                handler_fn(move |_req: Request, res: Response| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { res.end().await }
                }),
            )
        };
        state.add_global_middlewares([Arc::new(middleware_fn(|_req: Request, _res: Response, _next: Next| async {
            Err::<(), _>(io::Error::other("rejected"))
        })) as SharedMiddleware]);

        let mut error_handler = MockErrorHandler::new();
        error_handler.expect_handle().times(1).returning(|_, _, _| Ok(()));
        state.set_error_handler(Box::new(error_handler));

        let (res, _output) = capture();
        Dispatcher::new(state).dispatch(request(Method::GET, "/"), res).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn silent_middleware_is_not_an_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let state = {
            let calls = Arc::clone(&calls);
            state_with(
                "/",
                handler_fn(move |_req: Request, res: Response| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { res.end().await }
                }),
            )
        };
        state.add_global_middlewares([Arc::new(middleware_fn(|_req: Request, _res: Response, _next: Next| async {
            Ok::<(), BoxError>(())
        })) as SharedMiddleware]);

        let mut error_handler = MockErrorHandler::new();
        error_handler.expect_handle().never();
        state.set_error_handler(Box::new(error_handler));

        let (res, _output) = capture();
        Dispatcher::new(state).dispatch(request(Method::GET, "/"), res).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn not_found_failure_reaches_error_handler() {
        let state = Arc::new(ServerState::new());
        state.set_not_found_handler(Box::new(handler_fn(|_req: Request, _res: Response| async {
            Err::<(), _>(io::Error::other("no fallback"))
        })));

        let mut error_handler = MockErrorHandler::new();
        error_handler.expect_handle().withf(|error, _, _| error.to_string() == "no fallback").times(1).returning(|_, _, _| Ok(()));
        state.set_error_handler(Box::new(error_handler));

        let (res, _output) = capture();
        Dispatcher::new(state).dispatch(request(Method::GET, "/missing"), res).await.unwrap();
    }

    #[tokio::test]
    async fn failing_error_handler_is_returned() {
        let state = state_with("/", handler_fn(|_req: Request, _res: Response| async { Err::<(), _>(io::Error::other("first")) }));
        state.set_error_handler(Box::new(error_handler_fn(|_error: BoxError, _req: Request, _res: Response| async {
            Err::<(), _>(io::Error::other("second"))
        })));

        let (res, _output) = capture();
        let result = Dispatcher::new(state).dispatch(request(Method::GET, "/"), res).await;

        assert_eq!(result.unwrap_err().to_string(), "second");
    }

    #[tokio::test]
    async fn handler_slots_are_read_per_dispatch() {
        let state = Arc::new(ServerState::new());
        let dispatcher = Dispatcher::new(Arc::clone(&state));

        state.set_not_found_handler(Box::new(handler_fn(|_req: Request, res: Response| async move {
            res.set_status(StatusCode::GONE);
            res.end().await
        })));

        let (res, output) = capture();
        dispatcher.dispatch(request(Method::GET, "/old"), res).await.unwrap();
        assert!(output.text().await.starts_with("HTTP/1.1 410 Gone\r\n"));
    }

    #[tokio::test]
    async fn absorbed_failure_still_reaches_error_handler() {
        let state = state_with("/", handler_fn(|_req: Request, _res: Response| async { Err::<(), _>(io::Error::other("boom")) }));
        state.add_global_middlewares([Arc::new(middleware_fn(|req: Request, res: Response, next: Next| async move {
            let _ = next.run(req, res).await;
            Ok::<(), BoxError>(())
        })) as SharedMiddleware]);

        let mut error_handler = MockErrorHandler::new();
        error_handler.expect_handle().withf(|error, _, _| error.to_string() == "boom").times(1).returning(|_, _, _| Ok(()));
        state.set_error_handler(Box::new(error_handler));

        let (res, _output) = capture();
        Dispatcher::new(state).dispatch(request(Method::GET, "/"), res).await.unwrap();
    }

    #[tokio::test]
    async fn failure_after_next_is_reported_once() {
        let state = state_with("/", handler_fn(|_req: Request, _res: Response| async { Err::<(), _>(io::Error::other("inner")) }));
        state.add_global_middlewares([Arc::new(middleware_fn(|req: Request, res: Response, next: Next| async move {
            next.run(req, res).await.map_err(|_e| io::Error::other("outer"))
        })) as SharedMiddleware]);

        let mut error_handler = MockErrorHandler::new();
        error_handler
            .expect_handle()
            .withf(|error, _, _| error.to_string() == "inner" && error.is::<io::Error>())
            .times(1)
            .returning(|_, _, _| Ok(()));
        state.set_error_handler(Box::new(error_handler));

        let (res, _output) = capture();
        Dispatcher::new(state).dispatch(request(Method::GET, "/"), res).await.unwrap();
    }

    #[tokio::test]
    async fn failure_raised_after_successful_next_is_reported() {
        let state = state_with("/", handler_fn(|_req: Request, res: Response| async move { res.send("ok").await }));
        state.add_global_middlewares([Arc::new(middleware_fn(|req: Request, res: Response, next: Next| async move {
            next.run(req, res).await?;
            Err::<(), BoxError>(io::Error::other("audit failed").into())
        })) as SharedMiddleware]);

        let mut error_handler = MockErrorHandler::new();
        error_handler.expect_handle().withf(|error, _, _| error.to_string() == "audit failed").times(1).returning(|_, _, _| Ok(()));
        state.set_error_handler(Box::new(error_handler));

        let (res, _output) = capture();
        Dispatcher::new(state).dispatch(request(Method::GET, "/"), res).await.unwrap();
    }
}
