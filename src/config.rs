//! Configuration loading, validation, and pre-compiled runtime state.
//!
//! The proxy reads its YAML configuration exactly once at startup. The
//! selected theme is compiled at load time, so a broken template stops the
//! process before it accepts a single connection.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::proxy::BodyLimits;
use crate::render::{ErrorPageRenderer, ErrorPages};
use crate::{ProxyError, Result, themes};

/// Default socket address the proxy binds to.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8100";

/// Default total request timeout covering the entire upstream round-trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default idle timeout for pooled connections before they are closed.
pub const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum number of idle connections kept per upstream host.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 32;

/// Default cap on how much of an intercepted upstream body is held.
pub const DEFAULT_MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;

/// Default time allowed for reading an intercepted upstream body.
pub const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether the request details table is shown when not configured.
pub const DEFAULT_SHOW_DETAILS: bool = true;

/// Raw configuration as deserialized from the YAML file.
///
/// Unknown keys are ignored and every field is optional apart from
/// `upstream`, which [`Config::into_runtime`] insists on.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Socket address the proxy listens on (default `"127.0.0.1:8100"`).
    #[serde(default)]
    pub listen: Option<String>,
    /// The backend every request is forwarded to, e.g. `"http://localhost:3000"`.
    #[serde(default)]
    pub upstream: Option<String>,
    /// Total request timeout in milliseconds (default: 30000).
    /// Requests exceeding this receive a themed 504.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Bytes of an intercepted error body kept as a fallback while the page
    /// is prepared (default: 10 MiB). Anything past it is drained and
    /// discarded.
    #[serde(default)]
    pub max_body_size: Option<u64>,
    /// Time in milliseconds allowed for reading an intercepted error body
    /// (default: 30000). On expiry the page is sent without waiting further.
    #[serde(default)]
    pub body_timeout_ms: Option<u64>,
    /// Idle timeout in milliseconds for pooled connections (default: 60000).
    #[serde(default)]
    pub pool_idle_timeout_ms: Option<u64>,
    /// Maximum idle connections kept per upstream host (default: 32).
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
    /// Name of the bundled error page theme (default: `cats`).
    #[serde(default)]
    pub theme: Option<String>,
    /// Whether pages show the request details table (default: `true`).
    #[serde(default)]
    pub show_details: Option<bool>,
    /// Path to a localisation script embedded into every page.
    #[serde(default)]
    pub l10n_script: Option<PathBuf>,
}

/// Fully validated, ready-to-use configuration.
///
/// Created once at startup and shared across all request handlers via `Arc`.
#[derive(Debug)]
pub struct RuntimeConfig {
    pub listen: SocketAddr,
    pub upstream: hyper::Uri,
    /// Expiry yields a 504.
    pub request_timeout: Duration,
    /// Limits applied while an intercepted body is read.
    pub body_limits: BodyLimits,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    /// The compiled theme and page settings handed to every interceptor.
    pub pages: Arc<ErrorPages>,
}

fn validate_upstream(address: &str) -> Result<hyper::Uri> {
    if address.is_empty() {
        return Err(ProxyError::InvalidUpstream(
            "upstream address must not be empty".into(),
        ));
    }

    let uri = address
        .parse::<hyper::Uri>()
        .map_err(|e| ProxyError::InvalidUpstream(format!("{e}")))?;

    uri.authority().ok_or_else(|| {
        ProxyError::InvalidUpstream(format!("upstream URI has no authority: {address}"))
    })?;

    match uri.scheme_str() {
        Some("http") => Ok(uri),
        Some(other) => Err(ProxyError::InvalidUpstream(format!(
            "unsupported upstream scheme \"{other}\": {address}"
        ))),
        None => Err(ProxyError::InvalidUpstream(format!(
            "upstream URI has no scheme: {address}"
        ))),
    }
}

impl Config {
    /// Loads configuration from a YAML file at the given path.
    pub fn load_from_file(file_path: &(impl AsRef<Path> + ?Sized)) -> Result<Self> {
        let text = std::fs::read_to_string(file_path).map_err(|e| {
            ProxyError::Config(format!(
                "failed to open {}: {e}",
                file_path.as_ref().display()
            ))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parses configuration from YAML text. An empty document yields the
    /// defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
            .map_err(|e| ProxyError::Config(format!("failed to parse config: {e}")))
    }

    /// Builds the page bundle: resolves and compiles the theme and reads the
    /// localisation script, if any.
    pub fn error_pages(&self) -> Result<ErrorPages> {
        let theme = self.theme.as_deref().unwrap_or(themes::DEFAULT_THEME);
        let renderer = ErrorPageRenderer::from_theme(theme)?;
        let pages = ErrorPages::new(renderer, self.show_details.unwrap_or(DEFAULT_SHOW_DETAILS));

        match &self.l10n_script {
            Some(path) => {
                let script = std::fs::read_to_string(path).map_err(|e| {
                    ProxyError::Config(format!(
                        "failed to read l10n script {}: {e}",
                        path.display()
                    ))
                })?;
                Ok(pages.with_l10n_script(script))
            }
            None => Ok(pages),
        }
    }

    /// Validates all fields and compiles the theme, producing a
    /// [`RuntimeConfig`].
    pub fn into_runtime(self) -> Result<RuntimeConfig> {
        let address = self
            .upstream
            .as_deref()
            .ok_or_else(|| ProxyError::Config("an upstream must be configured".into()))?;
        let upstream = validate_upstream(address)?;

        let listen_str = self.listen.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR);
        let listen = listen_str.parse::<SocketAddr>().map_err(|e| {
            ProxyError::Config(format!("invalid listen address \"{listen_str}\": {e}"))
        })?;

        let request_timeout = self
            .request_timeout_ms
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_millis);
        if request_timeout.is_zero() {
            return Err(ProxyError::Config(
                "request_timeout_ms must be positive".into(),
            ));
        }

        let body_timeout = self
            .body_timeout_ms
            .map_or(DEFAULT_BODY_TIMEOUT, Duration::from_millis);
        if body_timeout.is_zero() {
            return Err(ProxyError::Config("body_timeout_ms must be positive".into()));
        }
        let body_limits = BodyLimits {
            max_held: self.max_body_size.unwrap_or(DEFAULT_MAX_BODY_SIZE),
            read_timeout: body_timeout,
        };

        let pool_idle_timeout = self
            .pool_idle_timeout_ms
            .map_or(DEFAULT_POOL_IDLE_TIMEOUT, Duration::from_millis);

        let pool_max_idle_per_host = self
            .pool_max_idle_per_host
            .unwrap_or(DEFAULT_POOL_MAX_IDLE_PER_HOST);

        let pages = Arc::new(self.error_pages()?);

        Ok(RuntimeConfig {
            listen,
            upstream,
            request_timeout,
            body_limits,
            pool_idle_timeout,
            pool_max_idle_per_host,
            pages,
        })
    }
}
