//! HTTP/1.1 wire codec.
//!
//! Serializes requests and parses responses for the direct transport
//! handler. The head is parsed with `httparse`; bodies are framed by
//! `Content-Length`, chunked transfer coding, or connection close.
//!
//! This is deliberately a minimal client-side codec, not a general
//! protocol implementation: no pipelining, no upgrades, no trailer
//! propagation.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{BufMut, Bytes, BytesMut};
use http::StatusCode;
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, PROXY_AUTHORIZATION, TRANSFER_ENCODING};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use url::Url;

use crate::error::{Error, Result};
use crate::handler::settings::ProxyConfig;
use crate::message::{Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of response headers.
const MAX_HEADERS: usize = 64;

/// Maximum accepted response head size.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Maximum accepted chunk-size line length.
const MAX_LINE_BYTES: usize = 1024;

// ============================================================================
// Request Serialization
// ============================================================================

/// Writes a request in HTTP/1.1 framing.
///
/// A configured `proxy` selects the absolute-form request target (full
/// URL) versus origin form (path and query), and its credentials are
/// emitted as `Proxy-Authorization: Basic`. A `Host` header and
/// `Content-Length` are synthesized when the caller did not set them.
pub(crate) async fn write_request<W>(
    writer: &mut W,
    request: &Request,
    proxy: Option<&ProxyConfig>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(256 + request.body_len());

    buf.put_slice(request.method.as_str().as_bytes());
    buf.put_slice(b" ");
    if proxy.is_some() {
        buf.put_slice(request.url.as_str().as_bytes());
    } else {
        buf.put_slice(request.url.path().as_bytes());
        if let Some(query) = request.url.query() {
            buf.put_slice(b"?");
            buf.put_slice(query.as_bytes());
        }
    }
    buf.put_slice(b" HTTP/1.1\r\n");

    if !request.headers.contains_key(HOST) {
        let host = request.host()?;
        buf.put_slice(b"Host: ");
        buf.put_slice(host.as_bytes());
        if let Some(port) = request.url.port() {
            buf.put_slice(format!(":{port}").as_bytes());
        }
        buf.put_slice(b"\r\n");
    }

    if let Some(credentials) = proxy.and_then(|p| p.credentials.as_ref())
        && !request.headers.contains_key(PROXY_AUTHORIZATION)
    {
        let token = BASE64.encode(format!(
            "{}:{}",
            credentials.username, credentials.password
        ));
        buf.put_slice(b"Proxy-Authorization: Basic ");
        buf.put_slice(token.as_bytes());
        buf.put_slice(b"\r\n");
    }

    for (name, value) in &request.headers {
        buf.put_slice(name.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }

    if let Some(body) = &request.body
        && !request.headers.contains_key(CONTENT_LENGTH)
    {
        buf.put_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }

    buf.put_slice(b"\r\n");

    if let Some(body) = &request.body {
        buf.put_slice(body.as_slice());
    }

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Reads one HTTP/1.1 response.
///
/// Returns the response plus whether the connection may be kept alive
/// for another exchange.
///
/// # Errors
///
/// - [`Error::ConnectionClosed`] if the peer closed before sending a head
/// - [`Error::Wire`] for malformed framing
pub(crate) async fn read_response<R>(reader: &mut R, url: &Url) -> Result<(Response, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(8 * 1024);

    let (head_len, status, reason, headers, version_minor) = loop {
        let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Response::new(&mut storage);

        match parsed.parse(&buf[..]) {
            Ok(httparse::Status::Complete(head_len)) => {
                let code = parsed
                    .code
                    .ok_or_else(|| Error::wire("response missing status code"))?;
                let status = StatusCode::from_u16(code)
                    .map_err(|_| Error::wire(format!("invalid status code {code}")))?;
                let reason = parsed
                    .reason
                    .filter(|r| !r.is_empty())
                    .map(str::to_owned);
                let version_minor = parsed.version.unwrap_or(1);

                let mut headers = HeaderMap::new();
                for header in parsed.headers.iter() {
                    let name = HeaderName::from_bytes(header.name.as_bytes())
                        .map_err(|e| Error::wire(format!("bad header name: {e}")))?;
                    let value = HeaderValue::from_bytes(header.value)
                        .map_err(|e| Error::wire(format!("bad header value: {e}")))?;
                    headers.append(name, value);
                }

                break (head_len, status, reason, headers, version_minor);
            }
            Ok(httparse::Status::Partial) => {
                if buf.len() > MAX_HEAD_BYTES {
                    return Err(Error::wire("response head too large"));
                }
                let n = reader.read_buf(&mut buf).await?;
                if n == 0 {
                    if buf.is_empty() {
                        return Err(Error::ConnectionClosed);
                    }
                    return Err(Error::wire("connection closed mid-head"));
                }
            }
            Err(e) => return Err(Error::wire(format!("malformed response head: {e}"))),
        }
    };

    let _ = buf.split_to(head_len);

    let chunked = headers.get_all(TRANSFER_ENCODING).iter().any(|v| {
        v.to_str()
            .map(|s| s.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    });
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<usize>().ok());
    let bodyless = status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED;

    let (body, close_delimited) = if bodyless {
        (Bytes::new(), false)
    } else if chunked {
        (read_chunked(reader, &mut buf).await?, false)
    } else if let Some(len) = content_length {
        (read_sized(reader, &mut buf, len).await?, false)
    } else {
        (read_until_close(reader, &mut buf).await?, true)
    };

    let connection_has = |token: &str| {
        headers.get_all(CONNECTION).iter().any(|v| {
            v.to_str()
                .map(|s| s.to_ascii_lowercase().contains(token))
                .unwrap_or(false)
        })
    };
    let keep_alive = !close_delimited
        && if version_minor == 0 {
            connection_has("keep-alive")
        } else {
            !connection_has("close")
        };

    let mut response = Response::new(url.clone(), status)
        .with_headers(headers)
        .with_body(body);
    response.reason = reason;

    Ok((response, keep_alive))
}

// ============================================================================
// Body Framing
// ============================================================================

/// Reads exactly `len` body bytes.
async fn read_sized<R>(reader: &mut R, buf: &mut BytesMut, len: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    while buf.len() < len {
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return Err(Error::wire("connection closed mid-body"));
        }
    }
    Ok(buf.split_to(len).freeze())
}

/// Reads until the peer closes the connection (close-delimited body).
async fn read_until_close<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    loop {
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return Ok(buf.split().freeze());
        }
    }
}

/// Reads a chunked transfer-coded body. Trailers are consumed and dropped.
async fn read_chunked<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut body = BytesMut::new();

    loop {
        let line = read_line(reader, buf).await?;
        let size_text = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| Error::wire(format!("bad chunk size {size_text:?}")))?;

        if size == 0 {
            // Trailer section ends at the first empty line.
            loop {
                let trailer = read_line(reader, buf).await?;
                if trailer.is_empty() {
                    break;
                }
            }
            return Ok(body.freeze());
        }

        while buf.len() < size + 2 {
            let n = reader.read_buf(buf).await?;
            if n == 0 {
                return Err(Error::wire("connection closed mid-chunk"));
            }
        }
        body.extend_from_slice(&buf.split_to(size));
        let crlf = buf.split_to(2);
        if &crlf[..] != b"\r\n" {
            return Err(Error::wire("chunk missing CRLF terminator"));
        }
    }
}

/// Reads one CRLF-terminated line, returning it without the terminator.
async fn read_line<R>(reader: &mut R, buf: &mut BytesMut) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = buf.windows(2).position(|w| w == b"\r\n") {
            let line = buf.split_to(pos);
            let _ = buf.split_to(2);
            return Ok(String::from_utf8_lossy(&line).into_owned());
        }
        if buf.len() > MAX_LINE_BYTES {
            return Err(Error::wire("line too long"));
        }
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return Err(Error::wire("connection closed mid-line"));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use http::Method;
    use tokio::io::AsyncWriteExt;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("valid url")
    }

    async fn serialize(request: &Request, proxy: Option<&ProxyConfig>) -> String {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        write_request(&mut client, request, proxy)
            .await
            .expect("write");
        drop(client);

        let mut out = Vec::new();
        server.read_to_end(&mut out).await.expect("read");
        String::from_utf8(out).expect("utf8")
    }

    async fn parse(raw: &[u8]) -> (Response, bool) {
        let (mut writer, mut reader) = tokio::io::duplex(64 * 1024);
        writer.write_all(raw).await.expect("feed");
        drop(writer);
        read_response(&mut reader, &url("http://example.com/"))
            .await
            .expect("parse")
    }

    #[tokio::test]
    async fn test_write_origin_form() {
        let request = Request::get(url("http://example.com/a/b?x=1"));
        let text = serialize(&request, None).await;

        assert!(text.starts_with("GET /a/b?x=1 HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_write_absolute_form_for_proxy() {
        let request = Request::get(url("http://example.com/a"));
        let proxy = ProxyConfig::new("proxy", 8080);
        let text = serialize(&request, Some(&proxy)).await;
        assert!(text.starts_with("GET http://example.com/a HTTP/1.1\r\n"));
        assert!(!text.contains("Proxy-Authorization"));
    }

    #[tokio::test]
    async fn test_write_proxy_authorization_basic() {
        let request = Request::get(url("http://example.com/"));
        let proxy = ProxyConfig::new("proxy", 8080).with_credentials("user", "secret");
        let text = serialize(&request, Some(&proxy)).await;

        assert!(text.contains("Proxy-Authorization: Basic dXNlcjpzZWNyZXQ=\r\n"));
    }

    #[tokio::test]
    async fn test_write_caller_proxy_authorization_wins() {
        let request = Request::get(url("http://example.com/")).header(
            PROXY_AUTHORIZATION,
            HeaderValue::from_static("Bearer caller-token"),
        );
        let proxy = ProxyConfig::new("proxy", 8080).with_credentials("user", "secret");
        let text = serialize(&request, Some(&proxy)).await;

        assert!(text.contains("proxy-authorization: Bearer caller-token\r\n"));
        assert!(!text.contains("Basic"));
    }

    #[tokio::test]
    async fn test_write_host_with_explicit_port() {
        let request = Request::get(url("http://example.com:8080/"));
        let text = serialize(&request, None).await;
        assert!(text.contains("Host: example.com:8080\r\n"));
    }

    #[tokio::test]
    async fn test_write_body_and_content_length() {
        let request = Request::new(Method::POST, url("http://example.com/submit")).body("hello");
        let text = serialize(&request, None).await;

        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn test_read_content_length_body() {
        let (response, keep_alive) =
            parse(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.text(), "hello");
        assert!(keep_alive);
    }

    #[tokio::test]
    async fn test_read_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                    5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let (response, keep_alive) = parse(raw).await;

        assert_eq!(response.body.text(), "hello world");
        assert!(keep_alive);
    }

    #[tokio::test]
    async fn test_read_close_delimited_body() {
        let (response, keep_alive) = parse(b"HTTP/1.1 200 OK\r\n\r\nuntil-close").await;

        assert_eq!(response.body.text(), "until-close");
        assert!(!keep_alive, "close-delimited bodies end the connection");
    }

    #[tokio::test]
    async fn test_read_connection_close_header() {
        let (_, keep_alive) =
            parse(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n").await;
        assert!(!keep_alive);
    }

    #[tokio::test]
    async fn test_read_no_content_has_empty_body() {
        let (response, keep_alive) = parse(b"HTTP/1.1 204 No Content\r\n\r\n").await;
        assert!(response.body.is_empty());
        assert!(keep_alive);
    }

    #[tokio::test]
    async fn test_read_reason_phrase() {
        let (response, _) = parse(b"HTTP/1.1 404 Gone Fishing\r\nContent-Length: 0\r\n\r\n").await;
        assert_eq!(response.reason.as_deref(), Some("Gone Fishing"));
    }

    #[tokio::test]
    async fn test_read_eof_before_head_is_connection_closed() {
        let (writer, mut reader) = tokio::io::duplex(1024);
        drop(writer);

        let err = read_response(&mut reader, &url("http://x/"))
            .await
            .expect_err("empty stream");
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_read_malformed_head() {
        let (mut writer, mut reader) = tokio::io::duplex(1024);
        writer.write_all(b"NOT HTTP AT ALL\r\n\r\n").await.expect("feed");
        drop(writer);

        let err = read_response(&mut reader, &url("http://x/"))
            .await
            .expect_err("garbage");
        assert!(matches!(err, Error::Wire { .. }));
    }
}
