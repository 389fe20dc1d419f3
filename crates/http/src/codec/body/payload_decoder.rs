//! Request payload decoding for the three framings a request can use.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadDecoder {
    /// `Content-Length` framing, holding the bytes still expected.
    Remaining(u64),
    Chunked(ChunkedDecoder),
    Empty,
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(length) => Self::Remaining(length),
            PayloadSize::Chunked => Self::Chunked(ChunkedDecoder::new()),
            PayloadSize::Empty => Self::Empty,
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            Self::Remaining(0) | Self::Empty => Ok(Some(PayloadItem::Eof)),
            Self::Remaining(remaining) => {
                if src.is_empty() {
                    return Ok(None);
                }

                let take = usize::try_from(*remaining).map_or(src.len(), |remaining| remaining.min(src.len()));
                *remaining -= take as u64;
                Ok(Some(PayloadItem::Chunk(src.split_to(take).freeze())))
            }
            Self::Chunked(chunked) => chunked.decode(src),
        }
    }
}
