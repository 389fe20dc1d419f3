use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use http::Method;
use micro_dispatch_http::connection::HttpConnection;
use tokio::net::TcpListener;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::chain::merge_handler;
use crate::dispatcher::{Dispatcher, ServerState};
use crate::error::ServerError;
use crate::handler::{ErrorHandler, RequestHandler};
use crate::matcher::PathSpec;
use crate::middleware::{Middleware, RouteMiddlewares, SharedMiddleware};
use crate::router::{ROUTABLE_METHODS, Route};
use crate::static_files::StaticFiles;
use crate::utils::ensure;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_MAX_BODY_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerBuilder {
    host: String,
    max_body_size: u64,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { host: DEFAULT_HOST.to_owned(), max_body_size: DEFAULT_MAX_BODY_SIZE }
    }

    /// The interface `listen` binds to.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Request bodies above this size are answered with `413 Payload Too Large`.
    #[must_use]
    pub fn max_body_size(mut self, max_body_size: u64) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn build(self) -> Server {
        Server { state: Arc::new(ServerState::new()), host: self.host, max_body_size: self.max_body_size, listening: Mutex::new(None) }
    }
}

/// A routing server instance.
///
/// Routes, middlewares and handlers can be registered at any time, before or
/// while listening. Instances share nothing with each other.
pub struct Server {
    state: Arc<ServerState>,
    host: String,
    max_body_size: u64,
    listening: Mutex<Option<Listening>>,
}

/// The bound listener of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

struct Listening {
    handle: ListenerHandle,
    shutdown: CancellationToken,
    connections: TaskTracker,
    accept_task: JoinHandle<()>,
}

macro_rules! method_route {
    ($method:ident, $method_with:ident, $upper_case_method:ident) => {
        #[doc = concat!("Registers a `", stringify!($upper_case_method), "` route.")]
        pub fn $method<P, H>(&self, path: P, handler: H) -> Result<&Self, ServerError>
        where
            P: Into<PathSpec>,
            H: RequestHandler + 'static,
        {
            self.route(Method::$upper_case_method, path, RouteMiddlewares::None, handler)
        }

        #[doc = concat!("Registers a `", stringify!($upper_case_method), "` route with route-scoped middlewares.")]
        pub fn $method_with<P, M, H>(&self, path: P, middlewares: M, handler: H) -> Result<&Self, ServerError>
        where
            P: Into<PathSpec>,
            M: Into<RouteMiddlewares>,
            H: RequestHandler + 'static,
        {
            self.route(Method::$upper_case_method, path, middlewares, handler)
        }
    };
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    method_route!(get, get_with, GET);
    method_route!(post, post_with, POST);
    method_route!(put, put_with, PUT);
    method_route!(delete, delete_with, DELETE);
    method_route!(head, head_with, HEAD);
    method_route!(options, options_with, OPTIONS);
    method_route!(connect, connect_with, CONNECT);
    method_route!(patch, patch_with, PATCH);
    method_route!(trace, trace_with, TRACE);

    /// Appends a route for `method`.
    ///
    /// Routes are tried in registration order and the first match wins.
    /// Nothing is registered when this fails.
    pub fn route<P, M, H>(&self, method: Method, path: P, middlewares: M, handler: H) -> Result<&Self, ServerError>
    where
        P: Into<PathSpec>,
        M: Into<RouteMiddlewares>,
        H: RequestHandler + 'static,
    {
        ensure!(
            ROUTABLE_METHODS.contains(&method),
            ServerError::invalid_argument(format!("method {method} can't be routed"))
        );

        let matcher = path.into();
        matcher.validate()?;

        let handler = merge_handler(Arc::new(handler), &middlewares.into().into_vec());
        self.state.add_route(method, Route::new(matcher, handler));
        Ok(self)
    }

    /// Appends a middleware that runs for every route, before route-scoped ones.
    pub fn use_middleware<M: Middleware + 'static>(&self, middleware: M) -> &Self {
        self.state.add_global_middlewares([Arc::new(middleware) as SharedMiddleware]);
        self
    }

    pub fn use_middlewares<I>(&self, middlewares: I) -> &Self
    where
        I: IntoIterator<Item = SharedMiddleware>,
    {
        self.state.add_global_middlewares(middlewares);
        self
    }

    /// Serves the files under `root_dir` for `GET` requests whose path starts with `base_path`.
    ///
    /// With `cache` the directory is read now and later changes are not seen.
    pub fn static_files(&self, base_path: &str, root_dir: impl AsRef<Path>, cache: bool) -> Result<&Self, ServerError> {
        let files = StaticFiles::new(base_path, root_dir, cache)?;
        let prefix = files.base_path().to_owned();

        self.route(
            Method::GET,
            PathSpec::predicate(move |req| req.path().starts_with(&prefix)),
            RouteMiddlewares::None,
            files,
        )
    }

    pub fn set_error_handler<H: ErrorHandler + 'static>(&self, handler: H) -> &Self {
        self.state.set_error_handler(Box::new(handler));
        self
    }

    pub fn set_not_found_handler<H: RequestHandler + 'static>(&self, handler: H) -> &Self {
        self.state.set_not_found_handler(Box::new(handler));
        self
    }

    /// A handler serving this server's routes, usable with any connection.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.state))
    }

    /// The bound listener, present only while listening.
    pub fn instance(&self) -> Option<ListenerHandle> {
        self.listening().as_ref().map(|listening| listening.handle)
    }

    /// Binds `port` (0 picks a free one) and starts accepting connections in the background.
    pub async fn listen(&self, port: u32) -> Result<SocketAddr, ServerError> {
        let port = u16::try_from(port).map_err(|e| ServerError::invalid_argument(format!("port {port} is out of range: {e}")))?;
        ensure!(self.instance().is_none(), ServerError::invalid_argument("server is already listening"));

        let tcp_listener = TcpListener::bind((self.host.as_str(), port)).await.map_err(|e| {
            error!(cause = %e, host = %self.host, port, "bind server error");
            ServerError::transport(e)
        })?;
        let local_addr = tcp_listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let connections = TaskTracker::new();
        let accept_task = tokio::spawn(accept_loop(
            tcp_listener,
            Arc::new(self.dispatcher()),
            self.max_body_size,
            shutdown.clone(),
            connections.clone(),
        ));

        let mut listening = self.listening();
        if listening.is_some() {
            shutdown.cancel();
            return Err(ServerError::invalid_argument("server is already listening"));
        }
        *listening = Some(Listening { handle: ListenerHandle { local_addr }, shutdown, connections, accept_task });

        info!(%local_addr, "start listening");
        Ok(local_addr)
    }

    /// Stops accepting, closes idle connections and waits for in-flight requests to finish.
    pub async fn close(&self) -> Result<(), ServerError> {
        let listening = self
            .listening()
            .take()
            .ok_or_else(|| ServerError::transport(io::Error::new(io::ErrorKind::NotConnected, "server is not listening")))?;

        listening.shutdown.cancel();
        listening.accept_task.await.map_err(io::Error::other)?;

        listening.connections.close();
        listening.connections.wait().await;

        info!(local_addr = %listening.handle.local_addr, "server closed");
        Ok(())
    }

    fn listening(&self) -> MutexGuard<'_, Option<Listening>> {
        self.listening.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(listening) = self.listening().take() {
            listening.shutdown.cancel();
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("host", &self.host)
            .field("max_body_size", &self.max_body_size)
            .field("routes", &self.state.route_count())
            .field("instance", &self.instance())
            .finish()
    }
}

async fn accept_loop(
    tcp_listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    max_body_size: u64,
    shutdown: CancellationToken,
    connections: TaskTracker,
) {
    loop {
        let (tcp_stream, remote_addr) = select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = tcp_listener.accept() => match accepted {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            },
        };

        let dispatcher = Arc::clone(&dispatcher);
        let shutdown = shutdown.clone();

        connections.spawn(async move {
            let (reader, writer) = tcp_stream.into_split();
            let connection = HttpConnection::new(reader, writer).max_body_size(max_body_size).shutdown_signal(shutdown);
            match connection.process(dispatcher).await {
                Ok(()) => {
                    info!(%remote_addr, "finished process, connection shutdown");
                }
                Err(e) => {
                    error!(%remote_addr, cause = %e, "service has error, connection shutdown");
                }
            }
        });
    }

    info!("stop accepting connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::middleware::{middleware_fn, Next, RouteOptions};
    use crate::request::Request;
    use crate::response::Response;
    use crate::test_util::{capture, request};
    use indoc::indoc;
    use regex::Regex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    fn answer(body: &'static str) -> impl RequestHandler {
        handler_fn(move |_req: Request, res: Response| async move { res.send(body).await })
    }

    fn traced(trace: &Trace, name: &'static str) -> impl Middleware + use<> {
        let trace = Arc::clone(trace);
        middleware_fn(move |req: Request, res: Response, next: Next| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().unwrap().push(name);
                next.run(req, res).await
            }
        })
    }

    async fn body_of(server: &Server, method: Method, uri: &str) -> String {
        let (res, output) = capture();
        server.dispatcher().dispatch(request(method, uri), res).await.unwrap();
        let text = output.text().await;
        text.split_once("\r\n\r\n").map(|(_, body)| body.to_owned()).unwrap_or_default()
    }

    #[tokio::test]
    async fn first_registered_route_wins() {
        let server = Server::new();
        server
            .get(Regex::new("^/items").unwrap(), answer("pattern"))
            .unwrap()
            .get("/items", answer("exact"))
            .unwrap()
            .get("/items", answer("duplicate"))
            .unwrap();

        assert_eq!(server.state.route_count(), 3);
        assert_eq!(body_of(&server, Method::GET, "/items").await, "pattern");
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_first() {
        let server = Server::new();
        server.get("/", answer("one")).unwrap().get("/", answer("two")).unwrap();

        assert_eq!(server.state.route_count(), 2);
        assert_eq!(body_of(&server, Method::GET, "/").await, "one");
    }

    #[tokio::test]
    async fn global_then_route_scoped_order() {
        let trace = Trace::default();
        let server = Server::new();

        server.use_middleware(traced(&trace, "g1")).use_middleware(traced(&trace, "g2"));
        server
            .get_with("/", RouteOptions::default().middleware(traced(&trace, "r1")), {
                let trace = Arc::clone(&trace);
                handler_fn(move |_req: Request, res: Response| {
                    trace.lock().unwrap().push("handler");
                    async move { res.end().await }
                })
            })
            .unwrap();

        body_of(&server, Method::GET, "/").await;
        assert_eq!(*trace.lock().unwrap(), ["g1", "g2", "r1", "handler"]);
    }

    #[tokio::test]
    async fn late_global_middleware_applies_to_existing_routes() {
        let trace = Trace::default();
        let server = Server::new();
        server.post("/submit", answer("stored")).unwrap();

        assert_eq!(body_of(&server, Method::POST, "/submit").await, "stored");
        assert!(trace.lock().unwrap().is_empty());

        server.use_middlewares([Arc::new(traced(&trace, "late")) as SharedMiddleware]);

        assert_eq!(body_of(&server, Method::POST, "/submit").await, "stored");
        assert_eq!(*trace.lock().unwrap(), ["late"]);
    }

    #[tokio::test]
    async fn route_scoped_middlewares_stay_on_their_route() {
        let trace = Trace::default();
        let server = Server::new();

        server
            .get_with("/guarded", RouteMiddlewares::one(traced(&trace, "guard")), answer("guarded"))
            .unwrap()
            .get("/open", answer("open"))
            .unwrap();

        assert_eq!(body_of(&server, Method::GET, "/open").await, "open");
        assert!(trace.lock().unwrap().is_empty());

        assert_eq!(body_of(&server, Method::GET, "/guarded").await, "guarded");
        assert_eq!(*trace.lock().unwrap(), ["guard"]);
    }

    #[test]
    fn invalid_registration_changes_nothing() {
        let server = Server::new();

        assert!(matches!(server.get("", answer("empty")), Err(ServerError::InvalidArgument { .. })));

        let purge = Method::from_bytes(b"PURGE").unwrap();
        assert!(matches!(
            server.route(purge, "/cache", RouteMiddlewares::None, answer("purge")),
            Err(ServerError::InvalidArgument { .. })
        ));

        assert!(matches!(server.static_files("assets", ".", true), Err(ServerError::InvalidArgument { .. })));
        assert_eq!(server.state.route_count(), 0);
    }

    #[tokio::test]
    async fn predicate_route_sees_headers() {
        let server = Server::new();
        server
            .get(PathSpec::predicate(|req: &Request| req.header("x-beta").is_some()), answer("beta"))
            .unwrap()
            .get("/", answer("stable"))
            .unwrap();

        assert_eq!(body_of(&server, Method::GET, "/").await, "stable");
    }

    #[tokio::test]
    async fn static_cache_serves_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.txt"), "beta").unwrap();

        let server = Server::new();
        server.static_files("/static", dir.path(), true).unwrap();

        assert_eq!(body_of(&server, Method::GET, "/static/a.txt").await, "alpha");
        assert_eq!(body_of(&server, Method::GET, "/static/sub/b.txt").await, "beta");

        let (res, output) = capture();
        server.dispatcher().dispatch(request(Method::GET, "/static/missing.txt"), res).await.unwrap();
        assert!(output.text().await.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn instances_are_isolated() {
        let first = Server::new();
        let second = Server::new();
        first.get("/", answer("first")).unwrap();

        assert_eq!(body_of(&first, Method::GET, "/").await, "first");
        assert_eq!(body_of(&second, Method::GET, "/").await, "");
        assert_eq!(second.state.route_count(), 0);
    }

    #[tokio::test]
    async fn listen_rejects_out_of_range_port() {
        let server = Server::new();

        assert!(matches!(server.listen(70000).await, Err(ServerError::InvalidArgument { .. })));
        assert!(server.instance().is_none());
    }

    #[tokio::test]
    async fn listen_and_close_lifecycle() {
        let server = Server::builder().host("127.0.0.1").build();

        let local_addr = server.listen(0).await.unwrap();
        assert_eq!(server.instance().map(|handle| handle.local_addr()), Some(local_addr));
        assert!(matches!(server.listen(0).await, Err(ServerError::InvalidArgument { .. })));

        server.close().await.unwrap();
        assert!(server.instance().is_none());
        assert!(matches!(server.close().await, Err(ServerError::Transport { .. })));
    }

    #[tokio::test]
    async fn serves_requests_over_tcp() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = Server::builder().host("127.0.0.1").max_body_size(16).build();
        {
            let hits = Arc::clone(&hits);
            server
                .post(
                    "/echo",
                    handler_fn(move |req: Request, res: Response| {
                        hits.fetch_add(1, Ordering::SeqCst);
                        async move { res.send(req.body().clone()).await }
                    }),
                )
                .unwrap();
        }

        let local_addr = server.listen(0).await.unwrap();
        let mut stream = TcpStream::connect(local_addr).await.unwrap();
        let raw = indoc! {"
            POST /echo HTTP/1.1
            Content-Length: 4
            Connection: close

            ping"};
        stream.write_all(raw.as_bytes()).await.unwrap();

        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("\r\n\r\nping"));

        let mut stream = TcpStream::connect(local_addr).await.unwrap();
        stream.write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 32\r\n\r\n").await.unwrap();

        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        assert!(out.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_releases_idle_keep_alive_connections() {
        let server = Server::builder().host("127.0.0.1").build();
        server.get("/", answer("ok")).unwrap();

        let local_addr = server.listen(0).await.unwrap();
        let mut stream = TcpStream::connect(local_addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let mut received = Vec::new();
        let mut buf = [0_u8; 512];
        while !received.ends_with(b"\r\n\r\nok") {
            let n = stream.read(&mut buf).await.unwrap();
            assert_ne!(n, 0, "connection closed before the response arrived");
            received.extend_from_slice(&buf[..n]);
        }

        server.close().await.unwrap();

        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
