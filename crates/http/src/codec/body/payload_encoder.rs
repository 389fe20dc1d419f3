use std::fmt::Write;

use crate::ensure;
use crate::protocol::{PayloadItem, SendError};
use bytes::BytesMut;
use tokio_util::codec::Encoder;

/// Frames response body bytes according to the framing chosen with the response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
    finished: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// content-length payload, tracks the bytes still expected
    Length { remaining: u64 },

    /// transfer-encoding chunked payload
    Chunked,

    /// raw bytes, the end of the body is signalled by closing the connection
    UntilClose,

    /// the response must not carry a body (HEAD, 1xx, 204, 304), bytes are discarded
    NoBody,
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody, finished: false }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked, finished: false }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length { remaining: size }, finished: false }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose, finished: false }
    }

    pub fn is_finish(&self) -> bool {
        self.finished
    }

    /// Returns false when fewer bytes were written than the declared content length.
    pub fn is_complete(&self) -> bool {
        match &self.kind {
            Kind::Length { remaining } => *remaining == 0,
            Kind::Chunked | Kind::UntilClose | Kind::NoBody => true,
        }
    }

    pub fn is_close_delimited(&self) -> bool {
        matches!(self.kind, Kind::UntilClose)
    }
}

impl Encoder<PayloadItem> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        ensure!(!self.finished, SendError::Finished);

        match item {
            PayloadItem::Chunk(bytes) => {
                // an empty chunk would be read as the last-chunk marker
                if bytes.is_empty() {
                    return Ok(());
                }

                match &mut self.kind {
                    Kind::Length { remaining } => {
                        let len = bytes.len() as u64;
                        ensure!(
                            len <= *remaining,
                            SendError::invalid_body(format!("body exceeds content-length by {} bytes", len - *remaining))
                        );
                        dst.extend_from_slice(&bytes);
                        *remaining -= len;
                    }
                    Kind::Chunked => {
                        write!(dst, "{:X}\r\n", bytes.len()).map_err(SendError::invalid_body)?;
                        dst.reserve(bytes.len() + 2);
                        dst.extend_from_slice(&bytes);
                        dst.extend_from_slice(b"\r\n");
                    }
                    Kind::UntilClose => dst.extend_from_slice(&bytes),
                    Kind::NoBody => {}
                }
                Ok(())
            }
            PayloadItem::Eof => {
                if self.kind == Kind::Chunked {
                    dst.extend_from_slice(b"0\r\n\r\n");
                }
                self.finished = true;
                Ok(())
            }
        }
    }
}
