//! Content decompression middleware.
//!
//! Advertises `gzip, deflate` on requests that do not set their own
//! `Accept-Encoding` and transparently inflates matching response
//! bodies. Some servers send raw deflate streams despite the RFC
//! requiring zlib wrapping, so `deflate` decoding falls back to the
//! raw format when the zlib header is missing. After decoding, the
//! stale `Content-Encoding` and `Content-Length` headers are removed.

// ============================================================================
// Imports
// ============================================================================

use std::io::Read;

use async_trait::async_trait;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::handler::HttpHandler;
use crate::message::{Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// Encodings advertised when the caller sets none.
const ACCEPTED_ENCODINGS: &str = "gzip, deflate";

// ============================================================================
// CompressionHandler
// ============================================================================

/// Inflates gzip and deflate response bodies.
pub struct CompressionHandler<H> {
    inner: H,
}

impl<H> CompressionHandler<H> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<H> HttpHandler for CompressionHandler<H>
where
    H: HttpHandler,
{
    async fn send(&self, mut request: Request, cancel: &CancellationToken) -> Result<Response> {
        if !request.headers.contains_key(http::header::ACCEPT_ENCODING) {
            request.headers.insert(
                http::header::ACCEPT_ENCODING,
                HeaderValue::from_static(ACCEPTED_ENCODINGS),
            );
        }

        let mut response = self.inner.send(request, cancel).await?;

        let Some(encoding) = response
            .header("content-encoding")
            .map(str::trim)
            .map(str::to_ascii_lowercase)
        else {
            return Ok(response);
        };

        let decoded = match encoding.as_str() {
            "" | "identity" => return Ok(response),
            "gzip" => decode_gzip(response.body.as_slice())?,
            "deflate" => decode_deflate(response.body.as_slice())?,
            other => {
                // Unrequested encoding; hand the body through untouched.
                debug!(encoding = %other, "Passing through unknown content encoding");
                return Ok(response);
            }
        };

        debug!(
            encoding = %encoding,
            compressed = response.body.len(),
            decoded = decoded.len(),
            "Inflated response body"
        );
        response.body = decoded.into();
        response.headers.remove(http::header::CONTENT_ENCODING);
        response.headers.remove(http::header::CONTENT_LENGTH);
        Ok(response)
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

// ============================================================================
// Decoding
// ============================================================================

fn decode_gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoded = Vec::with_capacity(data.len() * 2);
    GzDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::wire(format!("bad gzip body: {e}")))?;
    Ok(decoded)
}

fn decode_deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoded = Vec::with_capacity(data.len() * 2);
    if ZlibDecoder::new(data).read_to_end(&mut decoded).is_ok() {
        return Ok(decoded);
    }

    // Raw stream without the zlib wrapper.
    decoded.clear();
    DeflateDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::wire(format!("bad deflate body: {e}")))?;
    Ok(decoded)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use flate2::Compression;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use http::StatusCode;
    use url::Url;

    struct EncodedServer {
        encoding: Option<&'static str>,
        body: Vec<u8>,
    }

    #[async_trait]
    impl HttpHandler for EncodedServer {
        async fn send(&self, request: Request, _cancel: &CancellationToken) -> Result<Response> {
            let accept = request
                .headers
                .get(http::header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_owned();

            let mut response =
                Response::new(request.url, StatusCode::OK).with_body(self.body.clone());
            response.headers.insert(
                http::header::HeaderName::from_static("x-accept-encoding"),
                HeaderValue::try_from(accept).expect("valid value"),
            );
            if let Some(encoding) = self.encoding {
                response.headers.insert(
                    http::header::CONTENT_ENCODING,
                    HeaderValue::from_static(encoding),
                );
            }
            Ok(response)
        }
    }

    fn request() -> Request {
        Request::get(Url::parse("http://example.com/").expect("valid url"))
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).expect("write");
        encoder.finish().expect("finish")
    }

    #[tokio::test]
    async fn test_advertises_encodings() {
        let handler = CompressionHandler::new(EncodedServer {
            encoding: None,
            body: b"plain".to_vec(),
        });

        let response = handler
            .send(request(), &CancellationToken::new())
            .await
            .expect("send");
        assert_eq!(response.header("x-accept-encoding"), Some("gzip, deflate"));
        assert_eq!(response.body.text(), "plain");
    }

    #[tokio::test]
    async fn test_caller_accept_encoding_wins() {
        let handler = CompressionHandler::new(EncodedServer {
            encoding: None,
            body: Vec::new(),
        });

        let req = request()
            .try_header("accept-encoding", "identity")
            .expect("valid header");
        let response = handler
            .send(req, &CancellationToken::new())
            .await
            .expect("send");
        assert_eq!(response.header("x-accept-encoding"), Some("identity"));
    }

    #[tokio::test]
    async fn test_decodes_gzip_and_strips_headers() {
        let handler = CompressionHandler::new(EncodedServer {
            encoding: Some("gzip"),
            body: gzip(b"hello compressed world"),
        });

        let response = handler
            .send(request(), &CancellationToken::new())
            .await
            .expect("send");
        assert_eq!(response.body.text(), "hello compressed world");
        assert_eq!(response.header("content-encoding"), None);
        assert_eq!(response.header("content-length"), None);
    }

    #[tokio::test]
    async fn test_decodes_zlib_deflate() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"zlib framed").expect("write");
        let body = encoder.finish().expect("finish");

        let handler = CompressionHandler::new(EncodedServer {
            encoding: Some("deflate"),
            body,
        });
        let response = handler
            .send(request(), &CancellationToken::new())
            .await
            .expect("send");
        assert_eq!(response.body.text(), "zlib framed");
    }

    #[tokio::test]
    async fn test_decodes_raw_deflate() {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"raw stream").expect("write");
        let body = encoder.finish().expect("finish");

        let handler = CompressionHandler::new(EncodedServer {
            encoding: Some("deflate"),
            body,
        });
        let response = handler
            .send(request(), &CancellationToken::new())
            .await
            .expect("send");
        assert_eq!(response.body.text(), "raw stream");
    }

    #[tokio::test]
    async fn test_corrupt_gzip_is_wire_error() {
        let handler = CompressionHandler::new(EncodedServer {
            encoding: Some("gzip"),
            body: b"definitely not gzip".to_vec(),
        });

        let err = handler
            .send(request(), &CancellationToken::new())
            .await
            .expect_err("corrupt body");
        assert!(matches!(err, Error::Wire { .. }));
    }
}
