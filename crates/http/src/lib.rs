//! The HTTP/1.x primitive underneath `micro-dispatch`.
//!
//! This crate reads requests off a byte stream and gives each one, body
//! included, to a [`handler::Handler`] together with an imperative
//! [`connection::ResponseWriter`]. It knows nothing about routing.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use http::Request;
//! use micro_dispatch_http::connection::{HttpConnection, ResponseWriter};
//! use micro_dispatch_http::handler::make_handler;
//! use micro_dispatch_http::protocol::SendError;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let handler = Arc::new(make_handler(hello_world));
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = Arc::clone(&handler);
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             match HttpConnection::new(reader, writer).process(handler).await {
//!                 Ok(()) => info!("finished process, connection shutdown"),
//!                 Err(e) => error!(cause = %e, "service has error, connection shutdown"),
//!             }
//!         });
//!     }
//! }
//!
//! async fn hello_world(request: Request<Bytes>, response: ResponseWriter) -> Result<(), SendError> {
//!     info!(path = request.uri().path(), body_size = request.body().len(), "receive request");
//!     response.with_headers(|headers| headers.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("text/plain")));
//!     response.end_with("Hello World!\r\n").await
//! }
//! ```
//!
//! # Modules
//!
//! - [`connection`]: connection lifecycle and the response writer
//! - [`protocol`]: request head, payload framing and error types
//! - [`codec`]: request decoding and response encoding
//! - [`handler`]: the handler trait and closure adapter
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - No TLS support (use a reverse proxy for HTTPS)
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
