//! Core proxy handler: request forwarding and response filtering.
//!
//! Every inbound request is forwarded to the configured upstream and gets
//! its own [`Interceptor`]. Upstream error responses, and the local replies
//! the proxy produces when the upstream fails, are replaced by the themed
//! error page on the way back.
//!
//! Every request is assigned a monotonically increasing id and wrapped in a
//! [`tracing::Span`] carrying structured fields.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::time::{timeout, timeout_at};
use tracing::{Instrument, debug, info, trace, warn};

use crate::host::UpstreamResponse;
use crate::config::{DEFAULT_BODY_TIMEOUT, DEFAULT_MAX_BODY_SIZE};
use crate::intercept::{Action, Interceptor};
use crate::{ProxyError, Result, RuntimeConfig, headers};

/// An alias to simplify the calls to `Box<dyn std::error::Error + Send + Sync>`.
type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased body used for both request forwarding and response streaming.
///
/// Upstream bodies, rendered pages, and local replies all erase into this
/// one type so the handler always returns the same response type.
pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, StdError>;

/// The HTTP client type for upstream connections.
pub type HttpClient = Client<HttpConnector, BoxBody>;

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Limits applied while an intercepted body is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimits {
    /// Bytes held as a fallback. Past this the rest of the body is drained
    /// and discarded.
    pub max_held: u64,
    /// Time allowed for the whole body. On expiry it counts as ended.
    pub read_timeout: Duration,
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self {
            max_held: DEFAULT_MAX_BODY_SIZE,
            read_timeout: DEFAULT_BODY_TIMEOUT,
        }
    }
}

/// Chunks of an intercepted body kept in case no replacement is made.
#[derive(Debug)]
struct HeldBody {
    chunks: Vec<Bytes>,
    size: u64,
    limit: u64,
    overflowed: bool,
}

impl HeldBody {
    fn new(limit: u64) -> Self {
        Self {
            chunks: Vec::new(),
            size: 0,
            limit,
            overflowed: false,
        }
    }

    fn push(&mut self, chunk: Bytes) {
        if self.overflowed {
            return;
        }
        self.size = self.size.saturating_add(chunk.len() as u64);
        if self.size > self.limit {
            warn!(limit = self.limit, "intercepted body exceeds size limit, discarding the rest");
            self.overflowed = true;
            self.chunks = Vec::new();
            return;
        }
        self.chunks.push(chunk);
    }

    fn into_bytes(self) -> Bytes {
        self.chunks
            .iter()
            .fold(BytesMut::new(), |mut buf, chunk| {
                buf.extend_from_slice(chunk);
                buf
            })
            .freeze()
    }
}

pub fn build_client(config: &RuntimeConfig) -> HttpClient {
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .build(HttpConnector::new())
}

/// Wraps a fully buffered payload into a [`BoxBody`].
pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| -> StdError { match never {} })
        .boxed()
}

/// Processes one inbound request.
///
/// 1. Hop-by-hop headers are stripped and `X-Forwarded-*` plus
///    `X-Request-Id` headers are set.
/// 2. The interceptor captures the request details it may show later.
/// 3. The request is rewritten to the upstream and sent with the configured
///    timeout. Failures become local replies (502, 504, 500).
/// 4. The response, upstream or local, runs through [`filter_response`].
pub async fn handle_request<B>(
    req: Request<B>,
    client: HttpClient,
    config: Arc<RuntimeConfig>,
    client_addr: SocketAddr,
) -> Response<BoxBody>
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<StdError>,
{
    let request_id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    let span = tracing::info_span!(
        "request",
        id = request_id,
        method = %req.method(),
        uri = %req.uri(),
        client = %client_addr,
        request_id = tracing::field::Empty,
    );

    async move {
        let (mut parts, body) = req.into_parts();

        headers::strip_hop_by_hop(&mut parts.headers);
        headers::inject_forwarding_headers(&mut parts.headers, client_addr);
        let header_id = headers::ensure_request_id(&mut parts.headers, request_id);
        tracing::Span::current().record("request_id", header_id.as_str());

        let mut interceptor = Interceptor::new(Arc::clone(&config.pages));
        interceptor.on_request_headers(&parts);

        let response = match forward(parts, body, &client, &config).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "replying locally");
                e.into_response()
                    .map(|body| body.map_err(|never| -> StdError { match never {} }).boxed())
            }
        };

        filter_response(response, &mut interceptor, config.body_limits).await
    }
    .instrument(span)
    .await
}

async fn forward<B>(
    mut parts: hyper::http::request::Parts,
    body: B,
    client: &HttpClient,
    config: &RuntimeConfig,
) -> Result<Response<BoxBody>>
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<StdError>,
{
    let authority = config
        .upstream
        .authority()
        .ok_or_else(|| ProxyError::InvalidUpstream("upstream has no authority".into()))?;
    headers::rewrite_host(&mut parts.headers, authority);
    parts.uri = rewrite_uri(&parts.uri, &config.upstream)?;

    debug!(upstream_uri = %parts.uri, headers = ?parts.headers, "forwarding request");

    let start = Instant::now();
    let request = Request::from_parts(parts, body.map_err(Into::into).boxed());
    let mut response = timeout(config.request_timeout, client.request(request))
        .await
        .map_err(|_elapsed| ProxyError::Timeout(config.request_timeout))??;

    info!(
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        upstream = %config.upstream,
        "upstream responded"
    );

    headers::strip_hop_by_hop(response.headers_mut());
    Ok(response.map(|body| body.map_err(|e| -> StdError { Box::new(e) }).boxed()))
}

/// Rewrites the original request URI to target the upstream, preserving
/// the path and query string.
fn rewrite_uri(original: &Uri, upstream: &Uri) -> Result<Uri> {
    let authority = upstream
        .authority()
        .ok_or_else(|| ProxyError::InvalidUpstream("upstream has no authority".into()))?;
    let scheme = upstream
        .scheme()
        .ok_or_else(|| ProxyError::InvalidUpstream("upstream has no scheme".into()))?;
    let path_and_query = original
        .path_and_query()
        .map_or("/", |pq| pq.as_str());

    Uri::builder()
        .scheme(scheme.clone())
        .authority(authority.clone())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ProxyError::Internal(format!("failed to build upstream URI: {e}")))
}

/// Runs a response through `interceptor`.
///
/// Pass-through responses keep streaming untouched. Intercepted bodies are
/// read frame by frame, held while the interceptor pauses, and answered
/// with the replacement page once the stream ends. A body that fails midway,
/// or outlives `limits.read_timeout`, counts as ended. At most
/// `limits.max_held` bytes are held; if no replacement was made they are
/// sent as they arrived, or nothing is sent once the limit was passed.
pub async fn filter_response<B>(
    response: Response<B>,
    interceptor: &mut Interceptor,
    limits: BodyLimits,
) -> Response<BoxBody>
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<StdError>,
{
    let (parts, body) = response.into_parts();
    let mut upstream = UpstreamResponse::new(parts);
    interceptor.on_response_headers(&mut upstream);

    let mut body: BoxBody = body.map_err(Into::into).boxed();
    if !interceptor.is_intercepting() {
        let (parts, _) = upstream.into_parts();
        return Response::from_parts(parts, body);
    }

    let deadline = tokio::time::Instant::now() + limits.read_timeout;
    let mut held = HeldBody::new(limits.max_held);
    loop {
        let next = if tokio::time::Instant::now() < deadline {
            timeout_at(deadline, body.frame()).await.ok()
        } else {
            None
        };

        let end_of_stream = match next {
            Some(Some(Ok(frame))) => {
                if let Ok(data) = frame.into_data() {
                    held.push(data);
                }
                body.is_end_stream()
            }
            Some(Some(Err(e))) => {
                warn!(error = %e, "intercepted body failed, treating as end of stream");
                true
            }
            Some(None) => true,
            None => {
                warn!(
                    timeout_ms = limits.read_timeout.as_millis() as u64,
                    "intercepted body read timed out, treating as end of stream"
                );
                true
            }
        };

        match interceptor.on_response_body(&mut upstream, end_of_stream) {
            Action::Pause => trace!(bytes = held.size, "holding intercepted body"),
            Action::Continue if end_of_stream => break,
            Action::Continue => {}
        }
    }

    let (parts, replacement) = upstream.into_parts();
    let payload = replacement.unwrap_or_else(|| held.into_bytes());
    Response::from_parts(parts, full_body(payload))
}
