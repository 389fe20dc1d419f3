//! The seam between a connection and the code answering its requests.
//!
//! A [`Handler`] receives the request with its body fully read, together with
//! a [`ResponseWriter`] it must end. Returning `Err` closes the connection.

use std::error::Error;
use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;
use http::Request;

use crate::connection::ResponseWriter;

pub type BoxError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, req: Request<Bytes>, resp: ResponseWriter) -> Result<(), BoxError>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut, Err> Handler for HandlerFn<F>
where
    F: Fn(Request<Bytes>, ResponseWriter) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Err>> + Send,
    Err: Into<BoxError>,
{
    async fn call(&self, req: Request<Bytes>, resp: ResponseWriter) -> Result<(), BoxError> {
        (self.f)(req, resp).await.map_err(Into::into)
    }
}

/// Turns an async function into a [`Handler`].
pub fn make_handler<F, Fut, Err>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Bytes>, ResponseWriter) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Err>> + Send,
    Err: Into<BoxError>,
{
    HandlerFn { f }
}
