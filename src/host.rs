//! The interface between the response filter and the proxy hosting it.
//!
//! Header names are lower-case. The pseudo-headers `:authority`, `:path`
//! and `:status` expose the request authority, the request path with query,
//! and the response status code as HTTP/2 names them.

use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::http::{request, response};

use crate::{ProxyError, Result};

/// Read access to the headers of the request being filtered.
pub trait RequestHost {
    /// Returns the value of `name`, or an error when it is absent or not
    /// valid text.
    fn request_header(&self, name: &str) -> Result<String>;
}

/// Mutating access to the response being filtered.
pub trait ResponseHost {
    fn response_header(&self, name: &str) -> Result<String>;

    fn remove_response_header(&mut self, name: &str) -> Result<()>;

    /// Appends a header value, keeping any existing ones.
    fn add_response_header(&mut self, name: &str, value: &str) -> Result<()>;

    /// Swaps the whole response body for `body`.
    fn replace_response_body(&mut self, body: Bytes) -> Result<()>;
}

impl RequestHost for request::Parts {
    fn request_header(&self, name: &str) -> Result<String> {
        let value = match name {
            ":authority" => self.uri.authority().map(|a| a.as_str().to_owned()),
            ":path" => self.uri.path_and_query().map(|pq| pq.as_str().to_owned()),
            _ => header_str(&self.headers, name),
        };
        value.ok_or_else(|| ProxyError::HeaderUnavailable(name.to_owned()))
    }
}

/// An upstream response whose headers are being filtered and whose body may
/// be swapped out before it reaches the client.
#[derive(Debug)]
pub struct UpstreamResponse {
    parts: response::Parts,
    replacement: Option<Bytes>,
}

impl UpstreamResponse {
    pub fn new(parts: response::Parts) -> Self {
        Self {
            parts,
            replacement: None,
        }
    }

    /// The body set by [`ResponseHost::replace_response_body`], if any.
    pub fn replacement(&self) -> Option<&Bytes> {
        self.replacement.as_ref()
    }

    pub fn into_parts(self) -> (response::Parts, Option<Bytes>) {
        (self.parts, self.replacement)
    }
}

impl ResponseHost for UpstreamResponse {
    fn response_header(&self, name: &str) -> Result<String> {
        let value = match name {
            ":status" => Some(self.parts.status.as_str().to_owned()),
            _ => header_str(&self.parts.headers, name),
        };
        value.ok_or_else(|| ProxyError::HeaderUnavailable(name.to_owned()))
    }

    fn remove_response_header(&mut self, name: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        self.parts.headers.remove(name);
        Ok(())
    }

    fn add_response_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.parts.headers.append(name, value);
        Ok(())
    }

    fn replace_response_body(&mut self, body: Bytes) -> Result<()> {
        self.replacement = Some(body);
        Ok(())
    }
}

fn header_str(headers: &hyper::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}
