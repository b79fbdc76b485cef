//! Inbound request representation, built from raw HTTP/1.x bytes with
//! [`httparse`] or assembled directly by an embedding server.

use std::borrow::Cow;

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::Url;

use super::{Headers, Method};

/// Errors that can occur while building a [`Request`] from raw bytes.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// An HTTP request as seen by the router.
///
/// The request target is split once into a path and an optional raw query
/// string. The path is percent-decoded up front and is what the router
/// matches on; the query stays raw until a route is selected and it is decoded
/// into a [`Query`](crate::context::Query). Absolute-form targets
/// (`http://host/a`) are reduced to their path and query.
///
/// # Examples
///
/// ```
/// use trierouter::http::{Method, Request};
///
/// let raw = b"GET /users/42?fields=name HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method(), &Method::Get);
/// assert_eq!(request.path(), "/users/42");
/// assert_eq!(request.query_string(), Some("fields=name"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
///
/// let request = Request::new(Method::Get, "/users/John%20Doe");
/// assert_eq!(request.path(), "/users/John Doe");
/// assert_eq!(request.target(), "/users/John%20Doe");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: String,
    path: String,
    query: Option<String>,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers accepted by [`Request::parse`].
    const MAX_HEADERS: usize = 64;

    /// Creates a request for `target`, which may carry a `?query` suffix.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            target: target.to_owned(),
            path,
            query,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Appends a header, builder style.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the body, builder style.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse a request head from `buf`.
    ///
    /// Returns the request and the offset at which the body begins. Whatever
    /// follows the header terminator is taken as the body verbatim; framing
    /// (`Content-Length`, chunking) is the embedding server's job.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the header block is not terminated yet.
    /// - [`RequestError::Parse`] — the data is malformed.
    /// - [`RequestError::MissingField`] — method or path is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = raw_req
            .method
            .map(Method::from)
            .ok_or(RequestError::MissingField { field: "method" })?;

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        let (path, query) = split_target(target);

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        Ok((
            Self {
                method,
                target: target.to_owned(),
                path,
                query,
                headers: header_map,
                body: Bytes::copy_from_slice(&buf[body_offset..]),
            },
            body_offset,
        ))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target exactly as received.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the percent-decoded request path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

// Splits a request target into its decoded path and raw query.
fn split_target(target: &str) -> (String, Option<String>) {
    if !target.starts_with('/') {
        if let Ok(url) = Url::parse(target) {
            return (decode_path(url.path()), url.query().map(str::to_owned));
        }
    }

    match target.split_once('?') {
        Some((path, query)) => (decode_path(path), Some(query.to_owned())),
        None => (decode_path(target), None),
    }
}

fn decode_path(raw: &str) -> String {
    match percent_decode_str(raw).decode_utf8() {
        Ok(Cow::Borrowed(path)) => path.to_owned(),
        Ok(Cow::Owned(path)) => path,
        Err(_) => percent_decode_str(raw).decode_utf8_lossy().into_owned(),
    }
}
