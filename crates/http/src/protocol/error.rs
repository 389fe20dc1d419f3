use std::error::Error;
use std::io;

use http::StatusCode;
use thiserror::Error;

/// Why a connection stopped serving requests.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("can't read request: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("can't write response: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("handler failed: {source}")]
    HandlerError { source: Box<dyn Error + Send + Sync> },
}

impl HttpError {
    pub fn handler<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Self::HandlerError { source: e.into() }
    }
}

/// A request that could not be decoded, or whose body broke a limit.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("request head is {current_size} bytes, limit is {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("more than {max_num} header fields")]
    TooManyHeaders { max_num: usize },

    #[error("malformed header: {reason}")]
    InvalidHeader { reason: String },

    #[error("unsupported http version {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("malformed method")]
    InvalidMethod,

    #[error("malformed request target")]
    InvalidUri,

    #[error("bad content-length: {reason}")]
    InvalidContentLength { reason: String },

    #[error("malformed body: {reason}")]
    InvalidBody { reason: String },

    #[error("request body is {current_size} bytes, limit is {max_size}")]
    TooLargeBody { current_size: u64, max_size: u64 },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(reason: S) -> Self {
        Self::InvalidHeader { reason: reason.to_string() }
    }

    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }

    pub fn too_large_body(current_size: u64, max_size: u64) -> Self {
        Self::TooLargeBody { current_size, max_size }
    }

    /// The status to answer the client with, `None` when the peer is already gone.
    pub fn response_status(&self) -> Option<StatusCode> {
        match self {
            Self::Io { .. } => None,
            Self::TooLargeBody { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            Self::TooLargeHeader { .. } | Self::TooManyHeaders { .. } => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            _ => Some(StatusCode::BAD_REQUEST),
        }
    }
}

/// Misuse of a [`ResponseWriter`](crate::connection::ResponseWriter), or a failed write.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("status and headers were already written")]
    HeadersSent,

    #[error("response was already ended")]
    Finished,

    #[error("connection has moved on from this response")]
    Detached,

    #[error("body doesn't fit the response framing: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
