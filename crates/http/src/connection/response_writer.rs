//! Imperative response writing.
//!
//! A [`ResponseWriter`] is handed to the request handler together with the
//! request. Status and headers are staged until the head is written, either
//! explicitly with [`ResponseWriter::write_head`] or implicitly by the first
//! body write. The body framing is fixed at that moment:
//!
//! - a known length (`end_with` before any write, or a staged `Content-Length`)
//!   is sent as a fixed-length body
//! - an open-ended HTTP/1.1 body is sent chunked
//! - an open-ended HTTP/1.0 body is close-delimited
//! - `HEAD` requests and 1xx/204/304 statuses never carry body bytes
//!
//! The writer is a cheap handle; clones share the same underlying stream.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::warn;

use crate::codec::{HeaderEncoder, PayloadEncoder};
use crate::ensure;
use crate::protocol::{PayloadItem, RequestHeader, ResponseHead, SendError};

/// The write half of a connection, type-erased.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Clone)]
pub struct ResponseWriter {
    shared: Arc<Shared>,
}

struct Shared {
    headers_sent: AtomicBool,
    finished: AtomicBool,
    staged: Mutex<Staged>,
    io: tokio::sync::Mutex<IoState>,
}

struct Staged {
    status: StatusCode,
    headers: HeaderMap,
}

struct IoState {
    writer: Option<BoxWriter>,
    encoder: Option<PayloadEncoder>,
    version: Version,
    keep_alive: bool,
    head_only: bool,
    buf: BytesMut,
}

/// What the connection gets back once the handler is done with the response.
pub(crate) struct Detached {
    pub(crate) writer: Option<BoxWriter>,
    pub(crate) finished: bool,
    pub(crate) keep_alive: bool,
}

impl ResponseWriter {
    /// Creates a writer over `writer` for a response of the given version.
    pub fn new<W>(writer: W, version: Version, keep_alive: bool) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::from_boxed(Box::new(writer), version, keep_alive, false)
    }

    /// Creates a writer answering `header`, taking the version, keep-alive and
    /// `HEAD` semantics from the request.
    pub fn for_request<W>(writer: W, header: &RequestHeader) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::from_boxed(Box::new(writer), header.version(), header.is_keep_alive(), header.method() == Method::HEAD)
    }

    pub(crate) fn from_boxed(writer: BoxWriter, version: Version, keep_alive: bool, head_only: bool) -> Self {
        let io = IoState { writer: Some(writer), encoder: None, version, keep_alive, head_only, buf: BytesMut::new() };
        let staged = Staged { status: StatusCode::OK, headers: HeaderMap::new() };

        Self {
            shared: Arc::new(Shared {
                headers_sent: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                staged: Mutex::new(staged),
                io: tokio::sync::Mutex::new(io),
            }),
        }
    }

    /// Returns true once the status line and headers have been written.
    pub fn headers_sent(&self) -> bool {
        self.shared.headers_sent.load(Ordering::Acquire)
    }

    /// Returns true once the response has been ended.
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// The staged status, or the status that was sent.
    pub fn status(&self) -> StatusCode {
        self.staged().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.staged().status = status;
    }

    /// Gives access to the staged headers. Changes after the head was written have no effect.
    pub fn with_headers<R>(&self, f: impl FnOnce(&mut HeaderMap) -> R) -> R {
        f(&mut self.staged().headers)
    }

    /// Writes the status line and the staged headers.
    pub async fn write_head(&self, status: StatusCode) -> Result<(), SendError> {
        let mut io = self.shared.io.lock().await;
        self.start(&mut io, Some(status), None)?;
        io.flush().await
    }

    /// Writes a piece of the body, sending the head first if needed.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<(), SendError> {
        let chunk = chunk.into();
        let mut io = self.shared.io.lock().await;
        ensure!(!self.is_finished(), SendError::Finished);

        if !self.headers_sent() {
            self.start(&mut io, None, None)?;
        }
        io.encode(PayloadItem::Chunk(chunk))?;
        io.flush().await
    }

    /// Ends the response.
    pub async fn end(&self) -> Result<(), SendError> {
        self.finish(None).await
    }

    /// Writes `body` as the last piece of the body and ends the response.
    ///
    /// When the head has not been sent yet, the response gets a `Content-Length` of `body`.
    pub async fn end_with(&self, body: impl Into<Bytes>) -> Result<(), SendError> {
        self.finish(Some(body.into())).await
    }

    async fn finish(&self, last: Option<Bytes>) -> Result<(), SendError> {
        let mut io = self.shared.io.lock().await;
        ensure!(!self.is_finished(), SendError::Finished);

        if !self.headers_sent() {
            let body_len = last.as_ref().map_or(0, Bytes::len) as u64;
            self.start(&mut io, None, Some(body_len))?;
        }
        if let Some(bytes) = last {
            io.encode(PayloadItem::Chunk(bytes))?;
        }
        io.encode(PayloadItem::Eof)?;

        if !io.encoder.as_ref().is_none_or(PayloadEncoder::is_complete) {
            warn!("response ended before reaching its content-length, connection will be closed");
            io.keep_alive = false;
        }

        io.flush().await?;
        self.shared.finished.store(true, Ordering::Release);
        Ok(())
    }

    fn start(&self, io: &mut IoState, status: Option<StatusCode>, body_len: Option<u64>) -> Result<(), SendError> {
        ensure!(!self.headers_sent(), SendError::HeadersSent);
        ensure!(io.writer.is_some(), SendError::Detached);

        let (status, mut headers) = {
            let mut staged = self.staged();
            if let Some(status) = status {
                staged.status = status;
            }
            (staged.status, staged.headers.clone())
        };

        let encoder = io.prepare_framing(status, &mut headers, body_len);

        let mut head = ResponseHead::new(());
        *head.status_mut() = status;
        *head.version_mut() = io.version;
        *head.headers_mut() = headers;

        HeaderEncoder.encode(head, &mut io.buf)?;
        io.encoder = Some(encoder);
        self.shared.headers_sent.store(true, Ordering::Release);
        Ok(())
    }

    /// Takes the stream back from the response, later writes fail with [`SendError::Detached`].
    pub(crate) async fn detach(&self) -> Detached {
        let mut io = self.shared.io.lock().await;
        let close_delimited = io.encoder.as_ref().is_some_and(PayloadEncoder::is_close_delimited);

        Detached { writer: io.writer.take(), finished: self.is_finished(), keep_alive: io.keep_alive && !close_delimited }
    }

    fn staged(&self) -> MutexGuard<'_, Staged> {
        self.shared.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IoState {
    fn prepare_framing(&mut self, status: StatusCode, headers: &mut HeaderMap, body_len: Option<u64>) -> PayloadEncoder {
        if connection_has_close(headers) {
            self.keep_alive = false;
        }

        let bodiless = status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED;

        let encoder = if bodiless {
            headers.remove(CONTENT_LENGTH);
            headers.remove(TRANSFER_ENCODING);
            PayloadEncoder::empty()
        } else if let Some(len) = body_len {
            headers.remove(TRANSFER_ENCODING);
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
            if self.head_only { PayloadEncoder::empty() } else { PayloadEncoder::fix_length(len) }
        } else if let Some(len) = declared_content_length(headers) {
            if self.head_only { PayloadEncoder::empty() } else { PayloadEncoder::fix_length(len) }
        } else if self.head_only {
            PayloadEncoder::empty()
        } else if self.version == Version::HTTP_11 {
            headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            PayloadEncoder::chunked()
        } else {
            self.keep_alive = false;
            PayloadEncoder::until_close()
        };

        match (self.version, self.keep_alive) {
            (Version::HTTP_11, false) => {
                headers.insert(CONNECTION, HeaderValue::from_static("close"));
            }
            (Version::HTTP_10, true) => {
                headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
            }
            _ => {}
        }

        encoder
    }

    fn encode(&mut self, item: PayloadItem) -> Result<(), SendError> {
        match &mut self.encoder {
            Some(encoder) => encoder.encode(item, &mut self.buf),
            None => Err(SendError::invalid_body("response head has not been written")),
        }
    }

    async fn flush(&mut self) -> Result<(), SendError> {
        let writer = self.writer.as_mut().ok_or(SendError::Detached)?;
        if !self.buf.is_empty() {
            writer.write_all(&self.buf).await?;
            self.buf.clear();
        }
        writer.flush().await?;
        Ok(())
    }
}

fn declared_content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}

fn connection_has_close(headers: &HeaderMap) -> bool {
    headers
        .get(CONNECTION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.split(',').any(|token| token.trim().eq_ignore_ascii_case("close")))
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("status", &self.status())
            .field("headers_sent", &self.headers_sent())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
