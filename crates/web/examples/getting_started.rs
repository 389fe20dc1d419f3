use std::time::Instant;

use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use micro_dispatch::{
    BoxError, Next, PathSpec, Request, Response, RouteMiddlewares, Server, error_handler_fn, handler_fn, middleware_fn,
};
use regex::Regex;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone)]
struct ApiKey(String);

async fn access_log(req: Request, res: Response, next: Next) -> Result<(), BoxError> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.path().to_owned();

    let result = next.run(req, res.clone()).await;
    info!(%method, path, status = res.status().as_u16(), elapsed = ?started.elapsed(), "request served");
    result
}

// curl -H 'x-api-key: secret' http://127.0.0.1:8080/admin
async fn require_api_key(mut req: Request, res: Response, next: Next) -> Result<(), BoxError> {
    let Some(key) = req.header("x-api-key").and_then(|value| value.to_str().ok()).map(ToOwned::to_owned) else {
        res.set_status(StatusCode::UNAUTHORIZED);
        res.send("missing x-api-key\r\n").await?;
        return Ok(());
    };

    req.extensions_mut().insert(ApiKey(key));
    next.run(req, res).await
}

async fn admin(req: Request, res: Response) -> Result<(), BoxError> {
    let key = req.extensions().get::<ApiKey>().map_or("", |key| key.0.as_str());
    res.send(format!("welcome, holder of {key}\r\n")).await?;
    Ok(())
}

// curl -d 'hello' http://127.0.0.1:8080/echo
async fn echo(req: Request, res: Response) -> Result<(), BoxError> {
    res.insert_header(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    res.send(req.body().clone()).await?;
    Ok(())
}

// curl http://127.0.0.1:8080/users/42
async fn user(req: Request, res: Response) -> Result<(), BoxError> {
    let id = req.path().trim_start_matches("/users/").parse::<u64>()?;
    res.send(format!("user {id}\r\n")).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let server = Server::builder().host("127.0.0.1").max_body_size(64 * 1024).build();
    server.use_middleware(middleware_fn(access_log));

    let registered = server
        .get("/", handler_fn(|_req: Request, res: Response| async move { res.send("micro-dispatch\r\n").await }))
        .and_then(|server| server.get_with("/admin", RouteMiddlewares::one(middleware_fn(require_api_key)), handler_fn(admin)))
        .and_then(|server| server.post("/echo", handler_fn(echo)))
        .and_then(|server| match Regex::new(r"^/users/[^/]+$") {
            Ok(pattern) => server.get(pattern, handler_fn(user)),
            Err(e) => Err(micro_dispatch::ServerError::invalid_argument(e)),
        })
        .and_then(|server| {
            server.get(
                PathSpec::predicate(|req: &Request| req.query().is_some_and(|query| query.contains("debug"))),
                handler_fn(|req: Request, res: Response| async move { res.send(format!("{:#?}\r\n", req.headers())).await }),
            )
        })
        .and_then(|server| server.static_files("/static", env!("CARGO_MANIFEST_DIR"), false));

    if let Err(e) = registered {
        error!(cause = %e, "invalid route registration");
        return;
    }

    server
        .set_not_found_handler(handler_fn(|req: Request, res: Response| async move {
            res.set_status(StatusCode::NOT_FOUND);
            res.send(format!("nothing at {}\r\n", req.path())).await
        }))
        .set_error_handler(error_handler_fn(|error: BoxError, req: Request, res: Response| async move {
            warn!(cause = %error, path = req.path(), "request failed");
            if res.headers_sent() {
                return res.end().await;
            }
            res.set_status(StatusCode::BAD_REQUEST);
            res.send(format!("{error}\r\n")).await
        }));

    let local_addr = match server.listen(8080).await {
        Ok(local_addr) => local_addr,
        Err(e) => {
            error!(cause = %e, "can't start server");
            return;
        }
    };
    info!(%local_addr, "server started, press ctrl-c to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(cause = %e, "can't listen for shutdown signal");
    }
    if let Err(e) = server.close().await {
        error!(cause = %e, "server did not close cleanly");
    }
}
