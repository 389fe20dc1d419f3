//! Request header decoding and response head encoding.
//!
//! - [`HeaderDecoder`]: parses request headers from raw bytes, enforcing the
//!   header count and size limits, and derives the payload framing
//! - [`HeaderEncoder`]: writes the status line and header fields of a response

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
