//! Method and path routing, ordered middleware chains, static files and
//! centralized error handling on top of `micro-dispatch-http`.
//!
//! # Example
//!
//! ```no_run
//! use micro_dispatch::{handler_fn, middleware_fn, Next, Request, Response, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let server = Server::new();
//!
//!     server.use_middleware(middleware_fn(|req: Request, res: Response, next: Next| async move {
//!         tracing::info!(path = req.path(), "incoming request");
//!         next.run(req, res).await
//!     }));
//!
//!     server.get("/", handler_fn(|_req: Request, res: Response| async move { res.send("hello world").await }))?;
//!     server.static_files("/static", "./public", true)?;
//!
//!     server.listen(3000).await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Request flow
//!
//! Every registration rebuilds a compiled route table in which each route
//! handler is already wrapped with the global middlewares, then the
//! route-scoped ones. A request is matched against the routes of its method
//! in registration order; the first match runs, otherwise the not-found
//! handler does. A failure anywhere in the chain is given to the error
//! handler, once.

mod chain;
mod dispatcher;
mod error;
mod handler;
mod matcher;
mod middleware;
mod request;
mod response;
mod server;
mod static_files;
mod utils;

pub mod router;

#[cfg(test)]
mod test_util;

pub use chain::{merge_handler, MiddlewareWrapper, Wrapper};
pub use dispatcher::Dispatcher;
pub use error::{BoxError, RecordedFailure, ServerError};
pub use handler::{
    error_handler_fn, handler_fn, ErrorHandler, FnErrorHandler, FnHandler, LogAndRespond, NotFound, RequestHandler,
    SharedHandler,
};
pub use matcher::{fn_filter, Filter, PathSpec};
pub use middleware::{middleware_fn, FnMiddleware, Middleware, Next, RouteMiddlewares, RouteOptions, SharedMiddleware};
pub use request::Request;
pub use response::Response;
pub use server::{ListenerHandle, Server, ServerBuilder};
pub use static_files::StaticFiles;
