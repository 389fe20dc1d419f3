//! Core HTTP protocol types.
//!
//! - **Message Handling** ([`Message`], [`PayloadItem`], [`PayloadSize`]): what the
//!   request decoder produces, a header followed by payload items
//! - **Request Processing** ([`RequestHeader`]): request headers plus connection
//!   level helpers (keep-alive, expect-continue)
//! - **Response Processing** ([`ResponseHead`]): response headers before the body
//! - **Error Handling** ([`HttpError`], [`ParseError`], [`SendError`])

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
