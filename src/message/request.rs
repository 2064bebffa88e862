//! HTTP request type.
//!
//! A [`Request`] is the uniform unit of work handed to every handler:
//! method, absolute URL, header multimap (ordered values per key,
//! case-insensitive names), optional body, optional protocol version hint.

// ============================================================================
// Imports
// ============================================================================

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, Version};
use url::Url;

use crate::error::{Error, Result};
use crate::message::Body;

// ============================================================================
// Request
// ============================================================================

/// An HTTP request.
///
/// # Example
///
/// ```
/// use pooled_http::Request;
/// use url::Url;
///
/// # fn example() -> pooled_http::Result<()> {
/// let url = Url::parse("http://example.com/search").expect("valid url");
/// let request = Request::get(url)
///     .try_header("accept", "text/html")?
///     .body("q=rust");
/// assert_eq!(request.method, http::Method::GET);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method.
    pub method: Method,

    /// Absolute target URL.
    pub url: Url,

    /// Header multimap. Names are case-insensitive; values for one name
    /// keep their insertion order.
    pub headers: HeaderMap,

    /// Optional body content.
    pub body: Option<Body>,

    /// Optional protocol version hint for the transport.
    pub version: Option<Version>,
}

// ============================================================================
// Request - Constructors
// ============================================================================

impl Request {
    /// Creates a request with the given method and URL.
    #[inline]
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            version: None,
        }
    }

    /// Creates a GET request.
    #[inline]
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a POST request.
    #[inline]
    #[must_use]
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Creates a PUT request.
    #[inline]
    #[must_use]
    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Creates a DELETE request.
    #[inline]
    #[must_use]
    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }
}

// ============================================================================
// Request - Builder Methods
// ============================================================================

impl Request {
    /// Appends a header with pre-validated name and value.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Appends a header, validating name and value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the name or value is not a legal
    /// header token.
    pub fn try_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::try_from(name)
            .map_err(|e| Error::config(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| Error::config(format!("invalid header value: {e}")))?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Sets the request body.
    #[inline]
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the protocol version hint.
    #[inline]
    #[must_use]
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }
}

// ============================================================================
// Request - Accessors
// ============================================================================

impl Request {
    /// Returns the body length in bytes (0 when there is no body).
    #[inline]
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Body::len)
    }

    /// Returns the target host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL has no host component.
    pub fn host(&self) -> Result<&str> {
        self.url
            .host_str()
            .ok_or_else(|| Error::config(format!("URL has no host: {}", self.url)))
    }

    /// Returns the target port, falling back to the scheme default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL scheme has no known port.
    pub fn port(&self) -> Result<u16> {
        self.url
            .port_or_known_default()
            .ok_or_else(|| Error::config(format!("URL has no port: {}", self.url)))
    }

    /// Returns the approximate serialized size of the request head,
    /// in bytes.
    ///
    /// Used by the statistics middleware; exact framing overhead is
    /// intentionally ignored.
    #[must_use]
    pub fn head_len(&self) -> usize {
        let mut len = self.method.as_str().len() + self.url.as_str().len() + 12;
        for (name, value) in &self.headers {
            len += name.as_str().len() + value.len() + 4;
        }
        len
    }
}

// ============================================================================
// Tests
// ============================================================================
