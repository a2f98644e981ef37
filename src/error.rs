//! Error types and HTTP status code mapping.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// Every failure the filter and its host proxy can produce.
#[derive(Debug)]
pub enum ProxyError {
    /// The configuration file could not be loaded, parsed, or validated.
    Config(String),
    /// A theme template was rejected while compiling.
    Template(String),
    /// A header could not be read from the host.
    HeaderUnavailable(String),
    /// The host refused a header or body mutation.
    Host(String),
    /// The upstream target URI is malformed or unparseable.
    InvalidUpstream(String),
    /// The upstream server returned an error or was unreachable.
    Upstream(Box<dyn std::error::Error + Send + Sync>),
    /// The upstream did not respond within the configured request timeout.
    Timeout(Duration),
    /// An internal error that does not fit other categories.
    Internal(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ProxyError>;

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Template(msg) => write!(f, "template error: {msg}"),
            Self::HeaderUnavailable(name) => write!(f, "header unavailable: {name}"),
            Self::Host(msg) => write!(f, "host error: {msg}"),
            Self::InvalidUpstream(msg) => write!(f, "invalid upstream: {msg}"),
            Self::Upstream(err) => write!(f, "upstream error: {err}"),
            Self::Timeout(limit) => write!(f, "upstream timed out after {limit:?}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Upstream(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl ProxyError {
    /// Returns the HTTP status code of the local reply for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Config(_)
            | Self::Template(_)
            | Self::HeaderUnavailable(_)
            | Self::Host(_)
            | Self::InvalidUpstream(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts this error into a local reply with a JSON body.
    ///
    /// Local replies travel through the same response filter as upstream
    /// responses, so clients normally see the themed page instead.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": match &self {
                Self::Config(_) => "config_error",
                Self::Template(_) => "template_error",
                Self::HeaderUnavailable(_) => "header_unavailable",
                Self::Host(_) => "host_error",
                Self::InvalidUpstream(_) => "invalid_upstream",
                Self::Upstream(_) => "upstream_error",
                Self::Timeout(_) => "upstream_timeout",
                Self::Internal(_) => "internal_error",
            },
            "message": self.to_string(),
        });

        Response::builder()
            .status(status)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap_or_else(|_| {
                let mut fallback = Response::new(Full::new(Bytes::new()));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            })
    }
}

impl From<hyper::Error> for ProxyError {
    fn from(err: hyper::Error) -> Self {
        Self::Upstream(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for ProxyError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        Self::Upstream(Box::new(err))
    }
}

impl From<hyper::http::Error> for ProxyError {
    fn from(err: hyper::http::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<hyper::header::InvalidHeaderValue> for ProxyError {
    fn from(err: hyper::header::InvalidHeaderValue) -> Self {
        Self::Host(err.to_string())
    }
}

impl From<hyper::header::InvalidHeaderName> for ProxyError {
    fn from(err: hyper::header::InvalidHeaderName) -> Self {
        Self::Host(err.to_string())
    }
}
