//! Request and response body content provider.
//!
//! A [`Body`] exposes its length and a re-openable byte view: cloning the
//! underlying [`Bytes`] is cheap and yields the full content again, so a
//! body can be re-sent on retries and redirects without buffering twice.

// ============================================================================
// Imports
// ============================================================================

use bytes::Bytes;

// ============================================================================
// Body
// ============================================================================

/// Byte content of a request or response.
///
/// # Example
///
/// ```
/// use pooled_http::Body;
///
/// let body = Body::from("hello");
/// assert_eq!(body.len(), 5);
/// assert_eq!(body.text(), "hello");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    /// The buffered content.
    bytes: Bytes,
}

impl Body {
    /// Creates an empty body.
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            bytes: Bytes::new(),
        }
    }

    /// Returns the content length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the body has no content.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns a re-openable view of the content.
    ///
    /// The returned [`Bytes`] shares the underlying buffer; calling this
    /// repeatedly always yields the full content from the start.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// Returns the content as a byte slice.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the content decoded as UTF-8, lossily.
    #[inline]
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
        }
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Self {
            bytes: Bytes::from_static(bytes),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self {
            bytes: Bytes::from(text.into_bytes()),
        }
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self {
            bytes: Bytes::from_static(text.as_bytes()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body() {
        let body = Body::empty();
        assert!(body.is_empty());
        assert_eq!(body.len(), 0);
        assert_eq!(body.text(), "");
    }

    #[test]
    fn test_body_reopenable() {
        let body = Body::from("payload");

        // Two independent reads both see the full content.
        let first = body.bytes();
        let second = body.bytes();
        assert_eq!(first, second);
        assert_eq!(&first[..], b"payload");
    }

    #[test]
    fn test_from_vec() {
        let body = Body::from(vec![1u8, 2, 3]);
        assert_eq!(body.len(), 3);
        assert_eq!(body.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_text_lossy() {
        let body = Body::from(vec![0xff, 0xfe]);
        // Invalid UTF-8 decodes lossily rather than failing.
        assert!(!body.text().is_empty());
    }
}
