use micro_dispatch::{Request, Response, Server, handler_fn};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let server = Server::builder().host("127.0.0.1").build();
    server
        .get("/", handler_fn(|_req: Request, res: Response| async move { res.send("hello world").await }))
        .expect("route should be valid");

    match server.listen(3000).await {
        Ok(local_addr) => info!(%local_addr, "hello world server started"),
        Err(e) => {
            error!(cause = %e, "can't start server");
            return;
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(cause = %e, "can't listen for shutdown signal");
    }

    if let Err(e) = server.close().await {
        error!(cause = %e, "server did not close cleanly");
    }
}
