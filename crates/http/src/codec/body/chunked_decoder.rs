//! Decoder for `Transfer-Encoding: chunked` payloads,
//! see [RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1).
//!
//! Chunk sizes (and their extensions) are parsed by `httparse`; trailer
//! fields are read and discarded, up to [`MAX_TRAILER_BYTES`].

use std::cmp;

use crate::ensure;
use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BytesMut};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

/// The trailer section gets the same budget as a request head.
pub const MAX_TRAILER_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size line
    Size,
    /// Read chunk data
    Body { remaining: u64 },
    /// Read the CRLF closing a chunk
    BodyCrlf,
    /// Skip trailer fields until the empty line
    Trailer { consumed: usize },
    /// Whole payload has been read
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: ChunkedState::Size }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkedState::Size => match httparse::parse_chunk_size(src) {
                    Ok(Status::Complete((consumed, size))) => {
                        src.advance(consumed);
                        trace!(size, "read chunk size");
                        self.state = if size == 0 { ChunkedState::Trailer { consumed: 0 } } else { ChunkedState::Body { remaining: size } };
                    }
                    Ok(Status::Partial) => return Ok(None),
                    Err(e) => return Err(ParseError::invalid_body(format!("invalid chunk size: {e:?}"))),
                },

                ChunkedState::Body { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let len = cmp::min(remaining, src.len() as u64);
                    let bytes = src.split_to(usize::try_from(len).unwrap_or(usize::MAX)).freeze();
                    let remaining = remaining - bytes.len() as u64;

                    self.state = if remaining == 0 { ChunkedState::BodyCrlf } else { ChunkedState::Body { remaining } };
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                ChunkedState::BodyCrlf => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    ensure!(&src[..2] == b"\r\n", ParseError::invalid_body("missing CRLF after chunk data"));
                    src.advance(2);
                    self.state = ChunkedState::Size;
                }

                ChunkedState::Trailer { consumed } => {
                    let line_end = src.windows(2).position(|window| window == b"\r\n");
                    let total = consumed + line_end.map_or(src.len(), |end| end + 2);
                    ensure!(total <= MAX_TRAILER_BYTES, ParseError::too_large_header(total, MAX_TRAILER_BYTES));

                    let Some(line_end) = line_end else {
                        return Ok(None);
                    };
                    src.advance(line_end + 2);
                    self.state = if line_end == 0 { ChunkedState::End } else { ChunkedState::Trailer { consumed: total } };
                }

                ChunkedState::End => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn decode_all(decoder: &mut ChunkedDecoder, buffer: &mut BytesMut) -> (Vec<u8>, bool) {
        let mut body = vec![];
        loop {
            match decoder.decode(buffer).unwrap() {
                Some(PayloadItem::Chunk(bytes)) => body.extend_from_slice(&bytes),
                Some(PayloadItem::Eof) => return (body, true),
                None => return (body, false),
            }
        }
    }

    #[test]
    fn test_basic() {
        let mut buffer = BytesMut::from(&b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\nGET"[..]);
        let mut decoder = ChunkedDecoder::new();

        let (body, eof) = decode_all(&mut decoder, &mut buffer);
        assert!(eof);
        assert_eq!(body, b"Wikipedia");
        assert_eq!(&buffer[..], b"GET");
    }

    #[test]
    fn test_split_input() {
        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"a;name=value\r\n01234"[..]);

        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"01234"))));
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice(b"56789\r");
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"56789"))));
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice(b"\n0\r\nExpires: never\r\n\r\n");
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Eof));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_invalid_size() {
        let mut buffer = BytesMut::from(&b"zz\r\nabc"[..]);
        let mut decoder = ChunkedDecoder::new();
        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::InvalidBody { .. })));
    }

    #[test]
    fn test_trailer_limit() {
        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"0\r\nX-Trace: "[..]);
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice("a".repeat(MAX_TRAILER_BYTES).as_bytes());
        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::TooLargeHeader { .. })));

        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"0\r\n"[..]);
        for i in 0..MAX_TRAILER_BYTES / 16 {
            buffer.extend_from_slice(format!("X-{i:05}: aaaaa\r\n").as_bytes());
        }
        buffer.extend_from_slice(b"\r\n");
        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn test_missing_crlf() {
        let mut buffer = BytesMut::from(&b"3\r\nabcXY0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"abc"))));
        assert!(decoder.decode(&mut buffer).is_err());
    }
}
