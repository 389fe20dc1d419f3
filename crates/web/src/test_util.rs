use bytes::Bytes;
use http::{Method, Version};
use micro_dispatch_http::connection::ResponseWriter;
use tokio::io::{AsyncReadExt, DuplexStream};

use crate::request::Request;
use crate::response::Response;

pub(crate) fn request(method: Method, uri: &str) -> Request {
    http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap().into()
}

/// A response writing into memory, and the reading end of it.
pub(crate) fn capture() -> (Response, Output) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    (ResponseWriter::new(server, Version::HTTP_11, true).into(), Output(client))
}

pub(crate) struct Output(DuplexStream);

impl Output {
    /// Everything written to the response, available once every handle to it is dropped.
    pub(crate) async fn text(mut self) -> String {
        let mut out = String::new();
        self.0.read_to_string(&mut out).await.unwrap();
        out
    }
}
