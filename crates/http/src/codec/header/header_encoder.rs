//! Serializes a response head: status line, header fields and the blank line.
//!
//! Framing headers (`Content-Length`, `Transfer-Encoding`, `Connection`) are
//! expected to be settled by the caller before encoding.

use crate::protocol::{ResponseHead, SendError};

use bytes::{BufMut, BytesMut};

use http::Version;
use std::fmt::Write;
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

#[derive(Debug)]
pub struct HeaderEncoder;

impl Encoder<ResponseHead> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, head: ResponseHead, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);

        let version = match head.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };

        write!(dst, "{} {} {}\r\n", version, head.status().as_str(), head.status().canonical_reason().unwrap_or(""))
            .map_err(SendError::invalid_body)?;

        for (header_name, header_value) in head.headers() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
