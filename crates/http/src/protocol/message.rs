use bytes::Bytes;

/// What the request decoder yields: a request head, then the pieces of its payload.
#[derive(Debug)]
pub enum Message<T> {
    Header(T),
    Payload(PayloadItem),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    Chunk(Bytes),
    /// The payload is complete; the next message belongs to the next request.
    Eof,
}

/// Request payload framing, derived from `Content-Length` and `Transfer-Encoding`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    Length(u64),
    Chunked,
    Empty,
}

impl PayloadSize {
    /// A `Content-Length: 0` request carries no payload at all.
    pub fn from_content_length(length: u64) -> Self {
        match length {
            0 => Self::Empty,
            n => Self::Length(n),
        }
    }

    /// The size announced up front, known only for `Content-Length` framing.
    pub fn declared_length(self) -> Option<u64> {
        match self {
            Self::Length(n) => Some(n),
            Self::Chunked | Self::Empty => None,
        }
    }

    pub fn is_empty(self) -> bool {
        self == Self::Empty
    }
}
