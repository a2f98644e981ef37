//! Server accept loop and graceful shutdown.
//!
//! Kept apart from `main()` so that the server can be driven from tests
//! without signal handling or process exit.

use std::convert::Infallible;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{HttpClient, RuntimeConfig, handle_request};

/// Accepts connections on `listener` and serves each through the proxy
/// pipeline.
///
/// Runs until `shutdown` resolves, then stops accepting new connections
/// and returns. Requests on already-spawned tasks finish independently.
pub async fn serve(
    listener: TcpListener,
    client: HttpClient,
    config: Arc<RuntimeConfig>,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, client_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(%e, "failed to accept connection");
                        continue;
                    }
                };

                let client = client.clone();
                let config = Arc::clone(&config);

                tokio::spawn(async move {
                    let svc = service_fn(move |req: hyper::Request<Incoming>| {
                        let client = client.clone();
                        let config = Arc::clone(&config);
                        async move {
                            Ok::<_, Infallible>(handle_request(req, client, config, client_addr).await)
                        }
                    });

                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await
                    {
                        warn!(%e, client = %client_addr, "connection error");
                    }
                });
            }
            () = &mut shutdown => {
                info!("shutting down, no longer accepting connections");
                break;
            }
        }
    }
}

/// Resolves on the first SIGINT or SIGTERM (Ctrl+C elsewhere).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received SIGINT, initiating graceful shutdown"),
                    _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
                }
                return;
            }
            Err(e) => warn!(%e, "failed to register SIGTERM handler, listening for SIGINT only"),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, initiating graceful shutdown"),
        Err(e) => {
            warn!(%e, "failed to listen for Ctrl+C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
