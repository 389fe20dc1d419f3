use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::header::{CONNECTION, CONTENT_LENGTH};
use http::{HeaderValue, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::codec::{Encoder, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::codec::{HeaderEncoder, RequestDecoder};
use crate::connection::response_writer::{BoxWriter, ResponseWriter};
use crate::ensure;
use crate::handler::Handler;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseHead, SendError};

const DEFAULT_MAX_BODY_SIZE: u64 = 1024 * 1024;

/// An HTTP/1.x connection.
///
/// Requests are processed one at a time. Each request body is read completely,
/// up to `max_body_size` bytes, before the handler sees the request. The
/// connection is kept open after a response when the request asked for
/// keep-alive, the response was ended and its framing allows reuse.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
pub struct HttpConnection<R> {
    framed_read: FramedRead<R, RequestDecoder>,
    writer: Option<BoxWriter>,
    max_body_size: u64,
    shutdown: Option<CancellationToken>,
}

impl<R> HttpConnection<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new<W>(reader: R, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), 8 * 1024),
            writer: Some(Box::new(writer)),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            shutdown: None,
        }
    }

    /// Requests with a larger body are answered with `413 Payload Too Large`.
    #[must_use]
    pub fn max_body_size(mut self, max_body_size: u64) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Once `token` is cancelled the connection stops waiting for further requests.
    #[must_use]
    pub fn shutdown_signal(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler + ?Sized,
    {
        loop {
            let next = match &self.shutdown {
                Some(token) => select! {
                    biased;
                    () = token.cancelled() => {
                        info!("server is shutting down, close idle connection");
                        return Ok(());
                    }
                    next = self.framed_read.next() => next,
                },
                None => self.framed_read.next().await,
            };

            match next {
                Some(Ok(Message::Header((header, payload_size)))) => {
                    if !self.do_process(header, payload_size, handler.as_ref()).await? {
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("receive payload while expecting a request header");
                    self.send_error_response(StatusCode::BAD_REQUEST).await?;
                    return Err(ParseError::invalid_body("need header while receive body").into());
                }

                Some(Err(e)) => {
                    error!(cause = %e, "can't receive next request");
                    if let Some(status) = e.response_status() {
                        self.send_error_response(status).await?;
                    }
                    return Err(e.into());
                }

                None => {
                    info!("cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }

    /// Returns whether the connection can serve another request.
    async fn do_process<H>(&mut self, header: RequestHeader, payload_size: PayloadSize, handler: &H) -> Result<bool, HttpError>
    where
        H: Handler + ?Sized,
    {
        let body = match self.receive_body(&header, payload_size).await {
            Ok(body) => body,
            Err(HttpError::RequestError { source }) => {
                error!(cause = %source, "can't read request body");
                if let Some(status) = source.response_status() {
                    self.send_error_response(status).await?;
                }
                return Err(source.into());
            }
            Err(e) => return Err(e),
        };

        let writer = self.writer.take().ok_or(SendError::Detached)?;
        let response = ResponseWriter::for_request(writer, &header);
        let request = header.body(body);

        let result = handler.call(request, response.clone()).await;
        let detached = response.detach().await;

        if let Err(e) = result {
            return Err(HttpError::handler(e));
        }

        if !detached.finished {
            warn!("handler returned without ending the response, connection shutdown");
            return Ok(false);
        }

        self.writer = detached.writer;
        Ok(detached.keep_alive && self.writer.is_some())
    }

    async fn receive_body(&mut self, header: &RequestHeader, payload_size: PayloadSize) -> Result<Bytes, HttpError> {
        if payload_size.is_empty() {
            return Ok(Bytes::new());
        }

        if let Some(length) = payload_size.declared_length() {
            ensure!(length <= self.max_body_size, ParseError::too_large_body(length, self.max_body_size).into());
        }

        if header.expects_continue() {
            let writer = self.writer.as_mut().ok_or(SendError::Detached)?;
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
            writer.flush().await.map_err(SendError::io)?;
            info!("receive expect request header, sent continue response");
        }

        let mut body = BytesMut::new();
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    let current_size = (body.len() + bytes.len()) as u64;
                    ensure!(current_size <= self.max_body_size, ParseError::too_large_body(current_size, self.max_body_size).into());
                    body.extend_from_slice(&bytes);
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => return Ok(body.freeze()),
                Some(Ok(Message::Header(_))) => return Err(ParseError::invalid_body("receive header while reading body").into()),
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ParseError::invalid_body("connection closed before the body was complete").into()),
            }
        }
    }

    async fn send_error_response(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let mut head = ResponseHead::new(());
        *head.status_mut() = status;
        head.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        head.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));

        let mut buf = BytesMut::new();
        HeaderEncoder.encode(head, &mut buf)?;
        writer.write_all(&buf).await.map_err(SendError::io)?;
        writer.flush().await.map_err(SendError::io)?;
        Ok(())
    }
}

impl<R> std::fmt::Debug for HttpConnection<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection").field("max_body_size", &self.max_body_size).finish_non_exhaustive()
    }
}
