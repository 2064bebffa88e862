//! HTTP response type.
//!
//! A [`Response`] carries the originating URL (which redirects update),
//! status code, optional raw reason phrase, header multimap, and body.

// ============================================================================
// Imports
// ============================================================================

use http::StatusCode;
use http::header::HeaderMap;
use url::Url;

use crate::error::{Error, Result};
use crate::message::Body;

// ============================================================================
// Response
// ============================================================================

/// An HTTP response.
///
/// # Example
///
/// ```ignore
/// let response = handler.send(request, &cancel).await?;
/// let response = response.ensure_success()?;
/// println!("{}", response.body.text());
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// URL the response was produced for. Redirect-following middleware
    /// updates this to the final hop.
    pub url: Url,

    /// Status code.
    pub status: StatusCode,

    /// Reason phrase exactly as the server sent it, if any.
    pub reason: Option<String>,

    /// Header multimap.
    pub headers: HeaderMap,

    /// Body content (already decompressed when the compression
    /// middleware is in the chain).
    pub body: Body,
}

// ============================================================================
// Response - Constructors
// ============================================================================

impl Response {
    /// Creates a response.
    #[inline]
    #[must_use]
    pub fn new(url: Url, status: StatusCode) -> Self {
        Self {
            url,
            status,
            reason: None,
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    /// Sets the raw reason phrase.
    #[inline]
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the headers.
    #[inline]
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body.
    #[inline]
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }
}

// ============================================================================
// Response - Accessors
// ============================================================================

impl Response {
    /// Returns `true` if the status is in `[200, 299]`.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the response unchanged when successful.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Status`] carrying the status code, reason phrase,
    /// and URL when the status is outside `[200, 299]`.
    pub fn ensure_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::status(
                self.status.as_u16(),
                self.reason_phrase(),
                self.url.as_str(),
            ))
        }
    }

    /// Returns the reason phrase the server sent, falling back to the
    /// canonical phrase for the status code.
    #[inline]
    #[must_use]
    pub fn reason_phrase(&self) -> String {
        self.reason
            .clone()
            .or_else(|| self.status.canonical_reason().map(str::to_owned))
            .unwrap_or_default()
    }

    /// Returns the first value of a header, decoded as UTF-8.
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the approximate serialized size of the response head,
    /// in bytes.
    #[must_use]
    pub fn head_len(&self) -> usize {
        let mut len = 15 + self.reason_phrase().len();
        for (name, value) in &self.headers {
            len += name.as_str().len() + value.len() + 4;
        }
        len
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("valid url")
    }

    #[test]
    fn test_is_success_boundaries() {
        let ok = Response::new(url("http://x/"), StatusCode::OK);
        assert!(ok.is_success());

        let no_content = Response::new(url("http://x/"), StatusCode::NO_CONTENT);
        assert!(no_content.is_success());

        let redirect = Response::new(url("http://x/"), StatusCode::FOUND);
        assert!(!redirect.is_success());

        let server_err = Response::new(url("http://x/"), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!server_err.is_success());
    }

    #[test]
    fn test_ensure_success_passes_through() {
        let response = Response::new(url("http://x/"), StatusCode::OK).with_body("data");
        let response = response.ensure_success().expect("2xx passes");
        assert_eq!(response.body.text(), "data");
    }

    #[test]
    fn test_ensure_success_carries_status() {
        let response = Response::new(url("http://example.com/missing"), StatusCode::NOT_FOUND);
        let err = response.ensure_success().expect_err("non-2xx fails");

        let Error::Status {
            status,
            reason,
            url,
        } = err
        else {
            panic!("wrong variant");
        };
        assert_eq!(status, 404);
        assert_eq!(reason, "Not Found");
        assert_eq!(url, "http://example.com/missing");
    }

    #[test]
    fn test_reason_phrase_prefers_raw() {
        let response =
            Response::new(url("http://x/"), StatusCode::NOT_FOUND).with_reason("Gone Fishing");
        assert_eq!(response.reason_phrase(), "Gone Fishing");
    }

    #[test]
    fn test_header_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/plain"),
        );
        let response = Response::new(url("http://x/"), StatusCode::OK).with_headers(headers);

        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(response.header("x-missing"), None);
    }
}
