use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by request handlers, middlewares and error handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a chain stage reports upward once its failure is held for the error handler.
///
/// It carries the message of the original failure, which the error handler
/// receives unchanged.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RecordedFailure {
    message: String,
}

impl RecordedFailure {
    pub(crate) fn new(error: &BoxError) -> Self {
        Self { message: error.to_string() }
    }
}

/// Errors surfaced synchronously by registration and by the listener lifecycle.
///
/// Runtime failures while serving a request never show up here, they are
/// given to the error handler instead.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: io::Error,
    },

    #[error("can't load static files from {}: {source}", path.display())]
    StaticFiles { path: PathBuf, source: io::Error },
}

impl ServerError {
    pub fn invalid_argument<S: ToString>(reason: S) -> Self {
        Self::InvalidArgument { reason: reason.to_string() }
    }

    pub fn transport<E: Into<io::Error>>(e: E) -> Self {
        Self::Transport { source: e.into() }
    }

    pub fn static_files<P: Into<PathBuf>, E: Into<io::Error>>(path: P, e: E) -> Self {
        Self::StaticFiles { path: path.into(), source: e.into() }
    }
}
