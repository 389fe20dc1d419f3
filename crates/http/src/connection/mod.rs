//! Connection handling.
//!
//! - [`HttpConnection`]: drives one connection, decoding requests, reading
//!   their bodies within the configured limit, handing them to a
//!   [`Handler`](crate::handler::Handler) and keeping the connection alive
//!   when both sides allow it
//! - [`ResponseWriter`]: the imperative response a handler writes to

mod http_connection;
mod response_writer;

pub use http_connection::HttpConnection;
pub use response_writer::BoxWriter;
pub use response_writer::ResponseWriter;
