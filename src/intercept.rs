//! Per-request response filter swapping error responses for themed pages.
//!
//! The host drives one [`Interceptor`] per request, strictly one event at a
//! time:
//!
//! 1. [`on_request_headers`](Interceptor::on_request_headers) captures the
//!    request details shown on the page.
//! 2. [`on_response_headers`](Interceptor::on_response_headers) classifies
//!    the status. Error responses get their body headers rewritten.
//! 3. [`on_response_body`](Interceptor::on_response_body) is called for
//!    every body chunk. Intercepted chunks are paused until the end of the
//!    stream, where the page is rendered and the body replaced.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::host::{RequestHost, ResponseHost};
use crate::render::{ErrorPages, RenderContext};
use crate::status;

/// Content type of every rendered page.
pub const PAGE_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Response headers describing a body that is about to be replaced.
const BODY_HEADERS: [&str; 3] = ["content-length", "content-encoding", "content-type"];

/// What the host should do with the event it just delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Forward and keep going.
    Continue,
    /// Hold the body chunk back until a later event continues.
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    RequestSeen,
    /// Not an error response. Every later event is a no-op.
    PassThrough,
    /// An error response whose body has not started yet.
    Intercepting,
    /// At least one intercepted chunk has been paused.
    Buffering,
    /// The page was rendered, or replacing the body failed.
    Done,
}

/// Request details captured for the page.
///
/// Every field is best effort and stays empty when its header is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedRequest {
    pub host: String,
    pub original_uri: String,
    pub forwarded_for: String,
    pub request_id: String,
    /// Status text as read from the response.
    pub status: String,
}

#[derive(Debug)]
pub struct Interceptor {
    pages: Arc<ErrorPages>,
    phase: Phase,
    captured: CapturedRequest,
}

impl Interceptor {
    pub fn new(pages: Arc<ErrorPages>) -> Self {
        Self {
            pages,
            phase: Phase::Idle,
            captured: CapturedRequest::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the current response is being replaced.
    pub fn is_intercepting(&self) -> bool {
        matches!(self.phase, Phase::Intercepting | Phase::Buffering)
    }

    pub fn captured(&self) -> &CapturedRequest {
        &self.captured
    }

    pub fn on_request_headers(&mut self, host: &impl RequestHost) -> Action {
        if self.phase != Phase::Idle {
            return Action::Continue;
        }

        let header = |name: &str| host.request_header(name).ok();
        self.captured.host = header(":authority")
            .or_else(|| header("host"))
            .unwrap_or_default();
        self.captured.original_uri = header(":path").unwrap_or_default();
        self.captured.forwarded_for = header("x-forwarded-for").unwrap_or_default();
        self.captured.request_id = header("x-request-id").unwrap_or_default();

        self.phase = Phase::RequestSeen;
        Action::Continue
    }

    pub fn on_response_headers(&mut self, host: &mut impl ResponseHost) -> Action {
        if !matches!(self.phase, Phase::Idle | Phase::RequestSeen) {
            return Action::Continue;
        }

        let status = match host.response_header(":status") {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "could not read response status, passing through");
                self.phase = Phase::PassThrough;
                return Action::Continue;
            }
        };

        if !status::is_error_status(&status) {
            debug!(%status, "passing response through");
            self.phase = Phase::PassThrough;
            return Action::Continue;
        }

        for name in BODY_HEADERS {
            if let Err(e) = host.remove_response_header(name) {
                warn!(header = name, error = %e, "could not remove response header");
            }
        }
        if let Err(e) = host.add_response_header("content-type", PAGE_CONTENT_TYPE) {
            warn!(error = %e, "could not set page content type");
        }

        info!(
            %status,
            host = %self.captured.host,
            uri = %self.captured.original_uri,
            "intercepting error response"
        );
        self.captured.status = status;
        self.phase = Phase::Intercepting;
        Action::Continue
    }

    /// Handles one body chunk. `end_of_stream` marks the last one.
    pub fn on_response_body(&mut self, host: &mut impl ResponseHost, end_of_stream: bool) -> Action {
        if !self.is_intercepting() {
            return Action::Continue;
        }

        if !end_of_stream {
            self.phase = Phase::Buffering;
            return Action::Pause;
        }

        self.phase = Phase::Done;
        let code = status::parse_status_digits(&self.captured.status);
        let ctx = RenderContext {
            host: self.captured.host.clone(),
            original_uri: self.captured.original_uri.clone(),
            forwarded_for: self.captured.forwarded_for.clone(),
            request_id: self.captured.request_id.clone(),
            ..self.pages.context(code)
        };
        let page = self.pages.render(ctx);
        let len = page.len();

        match host.replace_response_body(page) {
            Ok(()) => debug!(code, bytes = len, "replaced response body"),
            Err(e) => error!(code, error = %e, "failed to replace response body"),
        }
        Action::Continue
    }
}
