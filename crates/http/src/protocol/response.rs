use http::Response;

/// The header portion of an HTTP response, before any body bytes are written.
pub type ResponseHead = Response<()>;
