//! Handler traits and the built-in handlers.
//!
//! - [`RequestHandler`]: terminal handler of a route, also the shape of the not-found handler
//! - [`ErrorHandler`]: receives every failure raised while serving a request
//! - [`handler_fn`] / [`error_handler_fn`]: adapt async closures
//! - [`NotFound`] / [`LogAndRespond`]: the defaults installed on a new server

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::{error, warn};

use crate::error::BoxError;
use crate::request::Request;
use crate::response::Response;

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, req: Request, res: Response) -> Result<(), BoxError>;
}

pub type SharedHandler = Arc<dyn RequestHandler>;

/// An async Fn holder which implements [`RequestHandler`]
#[derive(Debug)]
pub struct FnHandler<F> {
    f: F,
}

pub fn handler_fn<F, Fut, E>(f: F) -> FnHandler<F>
where
    F: Fn(Request, Response) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send,
    E: Into<BoxError>,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut, E> RequestHandler for FnHandler<F>
where
    F: Fn(Request, Response) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send,
    E: Into<BoxError>,
{
    async fn invoke(&self, req: Request, res: Response) -> Result<(), BoxError> {
        (self.f)(req, res).await.map_err(Into::into)
    }
}

/// Owns the terminal response of a failed request.
///
/// A failure returned from here is not retried: the connection is closed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, error: BoxError, req: Request, res: Response) -> Result<(), BoxError>;
}

#[derive(Debug)]
pub struct FnErrorHandler<F> {
    f: F,
}

pub fn error_handler_fn<F, Fut, E>(f: F) -> FnErrorHandler<F>
where
    F: Fn(BoxError, Request, Response) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send,
    E: Into<BoxError>,
{
    FnErrorHandler { f }
}

#[async_trait]
impl<F, Fut, E> ErrorHandler for FnErrorHandler<F>
where
    F: Fn(BoxError, Request, Response) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send,
    E: Into<BoxError>,
{
    async fn handle(&self, error: BoxError, req: Request, res: Response) -> Result<(), BoxError> {
        (self.f)(error, req, res).await.map_err(Into::into)
    }
}

/// Answers `404 Not Found` with an empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

#[async_trait]
impl RequestHandler for NotFound {
    async fn invoke(&self, _req: Request, res: Response) -> Result<(), BoxError> {
        res.set_status(StatusCode::NOT_FOUND);
        res.end().await?;
        Ok(())
    }
}

/// Logs the failure and answers `500 Internal Server Error` when the head is still unsent.
///
/// Never fails: problems while writing the response are only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAndRespond;

#[async_trait]
impl ErrorHandler for LogAndRespond {
    async fn handle(&self, error: BoxError, req: Request, res: Response) -> Result<(), BoxError> {
        error!(cause = %error, method = %req.method(), path = req.path(), "request handling failed");

        if !res.headers_sent() {
            res.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        }

        if !res.is_finished() {
            if let Err(e) = res.end().await {
                warn!(cause = %e, "can't end response after failure");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{capture, request};
    use http::Method;
    use std::io;

    #[tokio::test]
    async fn handler_fn_invokes_closure() {
        let handler = handler_fn(|req: Request, res: Response| async move { res.send(req.path().to_owned()).await });
        let (res, output) = capture();

        handler.invoke(request(Method::GET, "/hello"), res).await.unwrap();
        assert!(output.text().await.ends_with("\r\n\r\n/hello"));
    }

    #[tokio::test]
    async fn not_found_answers_404() {
        let (res, output) = capture();

        NotFound.invoke(request(Method::GET, "/missing"), res).await.unwrap();
        assert!(output.text().await.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn log_and_respond_writes_500() {
        let (res, output) = capture();
        let failure: BoxError = io::Error::other("boom").into();

        LogAndRespond.handle(failure, request(Method::GET, "/"), res.clone()).await.unwrap();
        assert!(res.is_finished());
        drop(res);
        assert!(output.text().await.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    }

    #[tokio::test]
    async fn log_and_respond_keeps_status_once_headers_are_sent() {
        let (res, output) = capture();
        res.write_head(StatusCode::OK).await.unwrap();
        res.write("partial").await.unwrap();

        LogAndRespond.handle(io::Error::other("late").into(), request(Method::GET, "/"), res.clone()).await.unwrap();
        assert!(res.is_finished());
        drop(res);

        let text = output.text().await;
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("7\r\npartial\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn error_handler_fn_invokes_closure() {
        let handler = error_handler_fn(|error: BoxError, _req: Request, res: Response| async move {
            res.set_status(StatusCode::BAD_GATEWAY);
            res.send(error.to_string()).await
        });
        let (res, output) = capture();

        handler.handle(io::Error::other("upstream").into(), request(Method::GET, "/"), res).await.unwrap();

        let text = output.text().await;
        assert!(text.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
        assert!(text.ends_with("upstream"));
    }
}
