//! Composition of a handler with an ordered list of middlewares.
//!
//! Wrapping is associative: wrapping `h` with `[r1]` and the result with
//! `[g1, g2]` runs `g1, g2, r1, h`, the same as wrapping `h` once with
//! `[g1, g2, r1]`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::handler::{RequestHandler, SharedHandler};
use crate::middleware::{Next, SharedMiddleware};
use crate::request::Request;
use crate::response::Response;

/// A wrapper that can wrap a handler to another
pub trait Wrapper<H> {
    /// the wrapper's output
    type Out;

    /// wrap the handler to another
    fn wrap(&self, handler: H) -> Self::Out;
}

/// Wraps a handler so that the middlewares run in front of it, first one outermost.
#[derive(Clone)]
pub struct MiddlewareWrapper {
    middlewares: Arc<[SharedMiddleware]>,
}

impl MiddlewareWrapper {
    pub fn new(middlewares: &[SharedMiddleware]) -> Self {
        Self { middlewares: middlewares.into() }
    }
}

impl Wrapper<SharedHandler> for MiddlewareWrapper {
    type Out = SharedHandler;

    fn wrap(&self, handler: SharedHandler) -> Self::Out {
        if self.middlewares.is_empty() {
            return handler;
        }
        Arc::new(Chain { middlewares: Arc::clone(&self.middlewares), endpoint: handler })
    }
}

/// Composes `handler` with `middlewares` into a single handler.
pub fn merge_handler(handler: SharedHandler, middlewares: &[SharedMiddleware]) -> SharedHandler {
    MiddlewareWrapper::new(middlewares).wrap(handler)
}

struct Chain {
    middlewares: Arc<[SharedMiddleware]>,
    endpoint: SharedHandler,
}

#[async_trait]
impl RequestHandler for Chain {
    async fn invoke(&self, req: Request, res: Response) -> Result<(), BoxError> {
        Next::new(Arc::clone(&self.middlewares), Arc::clone(&self.endpoint)).run(req, res).await
    }
}

impl std::fmt::Debug for MiddlewareWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareWrapper").field("middlewares", &self.middlewares.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::middleware::middleware_fn;
    use crate::test_util::{capture, request};
    use http::Method;
    use std::io;
    use std::sync::Mutex;

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    fn tracing_middleware(trace: &Trace, name: &'static str) -> SharedMiddleware {
        let trace = Arc::clone(trace);
        Arc::new(middleware_fn(move |req: Request, res: Response, next: Next| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().unwrap().push(name);
                next.run(req, res).await
            }
        }))
    }

    fn tracing_handler(trace: &Trace) -> SharedHandler {
        let trace = Arc::clone(trace);
        Arc::new(handler_fn(move |_req: Request, res: Response| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().unwrap().push("handler");
                res.send("done").await
            }
        }))
    }

    #[tokio::test]
    async fn nested_wrapping_keeps_order() {
        let trace = Trace::default();

        let route_scoped = merge_handler(tracing_handler(&trace), &[tracing_middleware(&trace, "r1")]);
        let global = merge_handler(route_scoped, &[tracing_middleware(&trace, "g1"), tracing_middleware(&trace, "g2")]);

        let (res, _output) = capture();
        global.invoke(request(Method::GET, "/"), res).await.unwrap();

        assert_eq!(*trace.lock().unwrap(), ["g1", "g2", "r1", "handler"]);
    }

    #[test]
    fn empty_list_returns_the_handler_itself() {
        let trace = Trace::default();
        let handler = tracing_handler(&trace);

        let merged = merge_handler(Arc::clone(&handler), &[]);
        assert!(Arc::ptr_eq(&handler, &merged));
    }

    #[tokio::test]
    async fn skipping_next_stops_the_chain() {
        let trace = Trace::default();
        let gate: SharedMiddleware = Arc::new(middleware_fn(|_req: Request, res: Response, _next: Next| async move {
            res.set_status(http::StatusCode::UNAUTHORIZED);
            res.end().await
        }));

        let chain = merge_handler(tracing_handler(&trace), &[gate, tracing_middleware(&trace, "after")]);

        let (res, output) = capture();
        chain.invoke(request(Method::GET, "/"), res).await.unwrap();

        assert!(trace.lock().unwrap().is_empty());
        assert!(output.text().await.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
    }

    #[tokio::test]
    async fn failure_travels_out_through_next() {
        let trace = Trace::default();
        let observed = Arc::new(Mutex::new(None));

        let observer: SharedMiddleware = {
            let observed = Arc::clone(&observed);
            Arc::new(middleware_fn(move |req: Request, res: Response, next: Next| {
                let observed = Arc::clone(&observed);
                async move {
                    let result = next.run(req, res).await;
                    *observed.lock().unwrap() = result.as_ref().err().map(ToString::to_string);
                    result
                }
            }))
        };
        let failing: SharedMiddleware = Arc::new(middleware_fn(|_req: Request, _res: Response, _next: Next| async move {
            Err::<(), _>(io::Error::other("denied"))
        }));

        let chain = merge_handler(tracing_handler(&trace), &[observer, failing]);

        let (res, _output) = capture();
        let result = chain.invoke(request(Method::GET, "/"), res).await;

        assert_eq!(result.unwrap_err().to_string(), "denied");
        assert_eq!(observed.lock().unwrap().as_deref(), Some("denied"));
        assert!(trace.lock().unwrap().is_empty());
    }
}
