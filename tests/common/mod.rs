//! Shared test infrastructure for integration tests.
//!
//! Provides throwaway HTTP backends, configuration builders, client
//! constructors, and a chunked body used across the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use error_pages_proxy::{BoxBody, Config, HttpClient, RuntimeConfig};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// A synthetic client address used in all test invocations.
const TEST_CLIENT_ADDR: &str = "192.168.1.100:54321";

/// Initializes a tracing subscriber for test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

pub fn test_addr() -> SocketAddr {
    TEST_CLIENT_ADDR.parse().unwrap()
}

pub fn test_client() -> HttpClient {
    Client::builder(TokioExecutor::new())
        .build(hyper_util::client::legacy::connect::HttpConnector::new())
}

/// Collects a [`BoxBody`] into a string, panicking on body errors so test
/// assertions remain concise.
pub async fn collect_text(body: BoxBody) -> String {
    let bytes = body
        .collect()
        .await
        .expect("failed to collect response body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("response body must be UTF-8")
}

/// Builds a `RuntimeConfig` targeting the given local backend address.
pub fn test_config(addr: SocketAddr) -> Arc<RuntimeConfig> {
    config_from(Config {
        upstream: Some(format!("http://{addr}")),
        theme: Some("app-down".into()),
        ..Default::default()
    })
}

/// Like [`test_config`] but with the details table hidden.
pub fn test_config_without_details(addr: SocketAddr) -> Arc<RuntimeConfig> {
    config_from(Config {
        upstream: Some(format!("http://{addr}")),
        show_details: Some(false),
        ..Default::default()
    })
}

/// Builds a `RuntimeConfig` with a short request timeout.
pub fn test_config_with_timeout(addr: SocketAddr, timeout_ms: u64) -> Arc<RuntimeConfig> {
    config_from(Config {
        upstream: Some(format!("http://{addr}")),
        request_timeout_ms: Some(timeout_ms),
        ..Default::default()
    })
}

fn config_from(config: Config) -> Arc<RuntimeConfig> {
    Arc::new(config.into_runtime().expect("test config must be valid"))
}

/// Returns an address nothing is listening on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("failed to bind throwaway listener");
    listener.local_addr().unwrap()
}

/// Starts a local HTTP server that responds to every request with the given
/// status, content-type, and body. Returns the server address and a handle
/// to shut it down.
pub async fn start_backend(
    status: StatusCode,
    content_type: &'static str,
    body: &'static str,
) -> (SocketAddr, oneshot::Sender<()>) {
    start_backend_with_delay(status, content_type, body, Duration::ZERO).await
}

/// Starts a backend that sleeps for `delay` before every response.
pub async fn start_slow_backend(delay: Duration) -> (SocketAddr, oneshot::Sender<()>) {
    start_backend_with_delay(StatusCode::OK, "text/plain", "slow", delay).await
}

async fn start_backend_with_delay(
    status: StatusCode,
    content_type: &'static str,
    body: &'static str,
    delay: Duration,
) -> (SocketAddr, oneshot::Sender<()>) {
    let (tx, rx) = oneshot::channel::<()>();

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("failed to bind test backend");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut shutdown = std::pin::pin!(async {
            let _ = rx.await;
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, _) = result.expect("accept failed");
                    let service = service_fn(move |_req: Request<Incoming>| async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .header("content-type", content_type)
                                .body(Full::new(Bytes::from(body)))
                                .expect("test response must build"),
                        )
                    });
                    tokio::spawn(async move {
                        let _ = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await;
                    });
                }
                () = &mut shutdown => break,
            }
        }
    });

    (addr, tx)
}

/// A body delivering its chunks as separate data frames.
pub struct Chunks(VecDeque<Bytes>);

impl Chunks {
    pub fn new(chunks: &[&'static str]) -> Self {
        Self(chunks.iter().map(|c| Bytes::from_static(c.as_bytes())).collect())
    }
}

impl Body for Chunks {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        Poll::Ready(self.0.pop_front().map(|chunk| Ok(Frame::data(chunk))))
    }

    fn is_end_stream(&self) -> bool {
        self.0.is_empty()
    }
}

/// A body that never ends, yielding the same chunk on every poll.
pub struct Endless(pub &'static str);

impl Body for Endless {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        Poll::Ready(Some(Ok(Frame::data(Bytes::from_static(self.0.as_bytes())))))
    }
}

/// A body that sends one chunk and then stalls forever.
pub struct Stalled(Option<Bytes>);

impl Stalled {
    pub fn new(first: &'static str) -> Self {
        Self(Some(Bytes::from_static(first.as_bytes())))
    }
}

impl Body for Stalled {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        match self.0.take() {
            Some(chunk) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            None => Poll::Pending,
        }
    }
}
