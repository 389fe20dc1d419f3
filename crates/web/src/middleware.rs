//! Middlewares and the continuation that drives them.
//!
//! A middleware receives the request, the response and a [`Next`]. Calling
//! [`Next::run`] continues with the following middleware, or with the route
//! handler once the list is exhausted. Returning without calling it ends the
//! chain for this request.
//!
//! Returning `Err` stops the chain. The first failure of a request is kept on
//! its [`Response`] and given to the error handler exactly once, even when an
//! enclosing middleware discards the `Err` it gets back from `next`. Enclosing
//! middlewares see a [`RecordedFailure`](crate::RecordedFailure) carrying the
//! same message.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::handler::SharedHandler;
use crate::request::Request;
use crate::response::Response;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: Request, res: Response, next: Next) -> Result<(), BoxError>;
}

pub type SharedMiddleware = Arc<dyn Middleware>;

/// The rest of a handler chain, seen from inside a middleware.
#[derive(Clone)]
pub struct Next {
    middlewares: Arc<[SharedMiddleware]>,
    cursor: usize,
    endpoint: SharedHandler,
}

impl Next {
    pub(crate) fn new(middlewares: Arc<[SharedMiddleware]>, endpoint: SharedHandler) -> Self {
        Self { middlewares, cursor: 0, endpoint }
    }

    /// Runs the remaining middlewares and the handler.
    pub async fn run(self, req: Request, res: Response) -> Result<(), BoxError> {
        let result = match self.middlewares.get(self.cursor) {
            Some(middleware) => {
                let middleware = Arc::clone(middleware);
                let next = Self { cursor: self.cursor + 1, ..self };
                middleware.handle(req, res.clone(), next).await
            }
            None => self.endpoint.invoke(req, res.clone()).await,
        };

        result.map_err(|e| res.record_failure(e))
    }

    /// The number of middlewares still ahead of the handler.
    pub fn remaining(&self) -> usize {
        self.middlewares.len() - self.cursor
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("remaining", &self.remaining()).finish_non_exhaustive()
    }
}

/// An async Fn holder which implements [`Middleware`]
#[derive(Debug)]
pub struct FnMiddleware<F> {
    f: F,
}

pub fn middleware_fn<F, Fut, E>(f: F) -> FnMiddleware<F>
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send,
    E: Into<BoxError>,
{
    FnMiddleware { f }
}

#[async_trait]
impl<F, Fut, E> Middleware for FnMiddleware<F>
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send,
    E: Into<BoxError>,
{
    async fn handle(&self, req: Request, res: Response, next: Next) -> Result<(), BoxError> {
        (self.f)(req, res, next).await.map_err(Into::into)
    }
}

/// Per-route settings accepted by the `*_with` registration methods.
#[derive(Clone, Default)]
pub struct RouteOptions {
    pub middlewares: Vec<SharedMiddleware>,
}

impl RouteOptions {
    #[must_use]
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }
}

impl fmt::Debug for RouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOptions").field("middlewares", &self.middlewares.len()).finish()
    }
}

/// The route-scoped middlewares of a registration.
#[derive(Clone, Default)]
pub enum RouteMiddlewares {
    #[default]
    None,
    One(SharedMiddleware),
    Many(Vec<SharedMiddleware>),
    Options(RouteOptions),
}

impl RouteMiddlewares {
    pub fn one<M: Middleware + 'static>(middleware: M) -> Self {
        Self::One(Arc::new(middleware))
    }

    pub fn many<I>(middlewares: I) -> Self
    where
        I: IntoIterator<Item = SharedMiddleware>,
    {
        Self::Many(middlewares.into_iter().collect())
    }

    /// The middlewares in the order they run.
    pub fn into_vec(self) -> Vec<SharedMiddleware> {
        match self {
            Self::None => Vec::new(),
            Self::One(middleware) => vec![middleware],
            Self::Many(middlewares) => middlewares,
            Self::Options(options) => options.middlewares,
        }
    }
}

impl From<SharedMiddleware> for RouteMiddlewares {
    fn from(middleware: SharedMiddleware) -> Self {
        Self::One(middleware)
    }
}

impl From<Vec<SharedMiddleware>> for RouteMiddlewares {
    fn from(middlewares: Vec<SharedMiddleware>) -> Self {
        Self::Many(middlewares)
    }
}

impl From<RouteOptions> for RouteMiddlewares {
    fn from(options: RouteOptions) -> Self {
        Self::Options(options)
    }
}

impl fmt::Debug for RouteMiddlewares {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::One(_) => f.write_str("One"),
            Self::Many(middlewares) => f.debug_tuple("Many").field(&middlewares.len()).finish(),
            Self::Options(options) => f.debug_tuple("Options").field(options).finish(),
        }
    }
}
