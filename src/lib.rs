//! A response filter that replaces 4xx/5xx bodies with themed HTML error
//! pages, and a small [Hyper] reverse proxy hosting it.
//!
//! The filter itself is host-agnostic: [`Interceptor`] talks to its proxy
//! through the [`RequestHost`] and [`ResponseHost`] traits. [`handle_request`]
//! drives it for the bundled proxy.
//!
//! [Hyper]: https://hyper.rs/

pub mod config;
pub mod error;
pub mod headers;
pub mod host;
pub mod intercept;
pub mod proxy;
pub mod render;
pub mod server;
pub mod status;
pub mod template;
pub mod themes;

pub use config::{Config, RuntimeConfig};
pub use error::{ProxyError, Result};
pub use host::{RequestHost, ResponseHost, UpstreamResponse};
pub use intercept::{Action, Interceptor, Phase};
pub use proxy::{BodyLimits, BoxBody, HttpClient, build_client, filter_response, full_body, handle_request};
pub use render::{ErrorPageRenderer, ErrorPages, RenderContext};
pub use server::{serve, shutdown_signal};
pub use template::Template;
