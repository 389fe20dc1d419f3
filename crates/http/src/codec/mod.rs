//! HTTP codec: request decoding and response framing.
//!
//! - [`RequestDecoder`]: a `tokio_util` [`Decoder`](tokio_util::codec::Decoder)
//!   yielding a request header followed by its payload items
//! - [`HeaderEncoder`]: writes a response head
//! - [`PayloadEncoder`]: frames response body bytes once the head has fixed the framing
//!
//! # Example
//!
//! ```no_run
//! use micro_dispatch_http::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("GET / HTTP/1.1\r\n\r\n");
//! let message = decoder.decode(&mut buffer);
//! ```

mod body;
mod header;
mod request_decoder;

pub use body::PayloadEncoder;
pub use header::HeaderEncoder;
pub use request_decoder::RequestDecoder;
