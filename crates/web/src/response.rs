//! The response handle given to middlewares and handlers.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use http::header::IntoHeaderName;
use http::{HeaderValue, StatusCode};
use micro_dispatch_http::connection::ResponseWriter;
use micro_dispatch_http::protocol::SendError;

use crate::error::{BoxError, RecordedFailure};

/// A cloneable handle over the connection's response.
///
/// Status and headers are staged until the head goes out, either through
/// [`Response::write_head`] or with the first body write. All clones write to
/// the same response.
///
/// The handle also carries the request's failure slot: the first failure
/// raised by a chain stage is kept here for the error handler, whatever the
/// enclosing middlewares do with the `Err` they get back.
#[derive(Debug, Clone)]
pub struct Response {
    writer: ResponseWriter,
    failure: Arc<Mutex<FailureSlot>>,
}

#[derive(Debug, Default)]
enum FailureSlot {
    #[default]
    Empty,
    Recorded(BoxError),
    Taken,
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.writer.status()
    }

    pub fn set_status(&self, status: StatusCode) {
        self.writer.set_status(status);
    }

    pub fn insert_header<K: IntoHeaderName>(&self, name: K, value: HeaderValue) {
        self.writer.with_headers(|headers| headers.insert(name, value));
    }

    pub fn append_header<K: IntoHeaderName>(&self, name: K, value: HeaderValue) {
        self.writer.with_headers(|headers| headers.append(name, value));
    }

    /// Returns true once the status line and headers have been written.
    pub fn headers_sent(&self) -> bool {
        self.writer.headers_sent()
    }

    pub fn is_finished(&self) -> bool {
        self.writer.is_finished()
    }

    pub async fn write_head(&self, status: StatusCode) -> Result<(), SendError> {
        self.writer.write_head(status).await
    }

    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<(), SendError> {
        self.writer.write(chunk).await
    }

    pub async fn end(&self) -> Result<(), SendError> {
        self.writer.end().await
    }

    /// Sends `body` as the complete remaining body and ends the response.
    pub async fn send(&self, body: impl Into<Bytes>) -> Result<(), SendError> {
        self.writer.end_with(body).await
    }

    /// Keeps the first failure of the request, returning what the stage reports upward.
    ///
    /// The first call stores `error` and hands back a [`RecordedFailure`] with
    /// the same message. Later calls return `error` untouched.
    pub(crate) fn record_failure(&self, error: BoxError) -> BoxError {
        let mut slot = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        match *slot {
            FailureSlot::Empty => {
                let recorded = RecordedFailure::new(&error);
                *slot = FailureSlot::Recorded(error);
                Box::new(recorded)
            }
            FailureSlot::Recorded(_) | FailureSlot::Taken => error,
        }
    }

    /// Takes the recorded failure; it is handed out at most once per request.
    pub(crate) fn take_failure(&self) -> Option<BoxError> {
        let mut slot = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *slot, FailureSlot::Taken) {
            FailureSlot::Recorded(error) => Some(error),
            FailureSlot::Empty | FailureSlot::Taken => None,
        }
    }
}

impl From<ResponseWriter> for Response {
    fn from(writer: ResponseWriter) -> Self {
        Self { writer, failure: Arc::default() }
    }
}
