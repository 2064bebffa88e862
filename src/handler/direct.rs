//! Direct HTTP/1.1 transport handler.
//!
//! A [`DirectHandler`] owns at most one keep-alive connection, opened
//! lazily on the first send and reused while the peer allows it. It is
//! the handler the pool wraps: one pooled connection corresponds to one
//! `DirectHandler` and therefore one underlying socket.
//!
//! Concurrent sends serialize on the socket (HTTP/1.1 allows one exchange
//! at a time); a pooled shared connection therefore behaves like a
//! keep-alive connection multiplexed across identities.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::handler::handler::HttpHandler;
use crate::handler::settings::{HandlerSettings, ProxyConfig};
use crate::handler::wire;
use crate::message::{Request, Response};
use crate::socket::{PooledSocket, SocketProvider};

// ============================================================================
// DirectHandler
// ============================================================================

/// Sends requests over one lazily opened, kept-alive TCP connection.
///
/// Honors the settings' proxy (absolute-form request target) and timeout.
/// Only plain `http` URLs are dialed directly; TLS is out of scope for
/// this transport.
pub struct DirectHandler {
    /// Socket source, shared with the rest of the transport.
    provider: Arc<SocketProvider>,
    /// Partition settings this handler was created under.
    settings: HandlerSettings,
    /// The kept-alive connection, if any.
    socket: Mutex<Option<PooledSocket>>,
}

// ============================================================================
// DirectHandler - Constructor
// ============================================================================

impl DirectHandler {
    /// Creates a handler bound to a provider and settings.
    ///
    /// No connection is opened until the first send.
    #[must_use]
    pub fn new(provider: Arc<SocketProvider>, settings: HandlerSettings) -> Self {
        Self {
            provider,
            settings,
            socket: Mutex::new(None),
        }
    }

    /// Returns the settings this handler was created under.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }
}

// ============================================================================
// DirectHandler - Exchange
// ============================================================================

impl DirectHandler {
    /// Resolves the dial target: the proxy when configured, else the
    /// request origin. The second element selects absolute-form framing.
    fn target(&self, request: &Request) -> Result<(String, u16, bool)> {
        if let Some(proxy) = &self.settings.proxy {
            return Ok((proxy.host.clone(), proxy.port, true));
        }
        if request.url.scheme() != "http" {
            return Err(Error::config(format!(
                "scheme {:?} requires an external TLS layer or a proxy",
                request.url.scheme()
            )));
        }
        Ok((request.host()?.to_owned(), request.port()?, false))
    }

    /// Opens a socket to the dial target, attributing refusals to the
    /// proxy when one is configured.
    async fn open_socket(
        &self,
        host: &str,
        port: u16,
        via_proxy: bool,
        cancel: &CancellationToken,
    ) -> Result<PooledSocket> {
        match self.provider.connect(host, port, cancel).await {
            Ok(socket) => Ok(socket),
            Err(Error::ConnectionRefused { message }) if via_proxy => {
                Err(Error::proxy_refused(message))
            }
            Err(err) => Err(err),
        }
    }

    /// Performs one request/response exchange, transparently reopening a
    /// stale kept-alive connection once.
    async fn exchange(&self, request: &Request, cancel: &CancellationToken) -> Result<Response> {
        let (host, port, via_proxy) = self.target(request)?;
        let mut guard = self.socket.lock().await;

        for attempt in 0..2u8 {
            let reused = guard.is_some();
            if guard.is_none() {
                *guard = Some(self.open_socket(&host, port, via_proxy, cancel).await?);
            }
            let Some(socket) = guard.as_mut() else {
                return Err(Error::wire("socket vanished mid-exchange"));
            };

            let result = Self::roundtrip(socket, request, self.settings.proxy.as_ref()).await;
            match result {
                Ok((response, keep_alive)) => {
                    if !keep_alive {
                        *guard = None;
                    }
                    return Ok(response);
                }
                // A reused connection may have been closed by the peer
                // between exchanges; reconnect once before failing.
                Err(Error::ConnectionClosed | Error::Io(_)) if reused && attempt == 0 => {
                    debug!(host, port, "Kept-alive connection stale, reopening");
                    *guard = None;
                }
                Err(err) => {
                    *guard = None;
                    return Err(err);
                }
            }
        }

        Err(Error::connection_refused(format!(
            "{host}:{port}: reopened connection failed immediately"
        )))
    }

    /// One write/read exchange on an established socket.
    async fn roundtrip(
        socket: &mut PooledSocket,
        request: &Request,
        proxy: Option<&ProxyConfig>,
    ) -> Result<(Response, bool)> {
        wire::write_request(socket, request, proxy).await?;
        wire::read_response(socket, &request.url).await
    }

    /// Drops the kept-alive socket if the lock is free.
    fn discard_socket(&self) {
        match self.socket.try_lock() {
            Ok(mut guard) => {
                *guard = None;
            }
            Err(_) => {
                // A concurrent exchange still holds the socket; it will
                // observe the failure itself.
                warn!("Socket busy during discard");
            }
        }
    }
}

// ============================================================================
// DirectHandler - HttpHandler
// ============================================================================

#[async_trait]
impl HttpHandler for DirectHandler {
    async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        let timeout = self.settings.timeout;

        let result = tokio::select! {
            result = tokio::time::timeout(timeout, self.exchange(&request, cancel)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(Error::request_timeout(timeout.as_millis() as u64)),
                }
            }
            () = cancel.cancelled() => Err(Error::Cancelled),
        };

        // After a timeout or cancellation the connection state is
        // unknown; never reuse it.
        if result.is_err() {
            self.discard_socket();
        }
        result
    }

    fn dispose(&self) {
        self.discard_socket();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;

    use crate::handler::settings::ProxyConfig;

    /// Minimal server: answers `responses` on one accepted connection,
    /// reading (and discarding) one request head before each.
    async fn one_shot_server(responses: Vec<&'static str>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            for response in responses {
                let mut buf = [0u8; 4096];
                let mut seen = Vec::new();
                loop {
                    let n = stream.read(&mut buf).await.expect("read");
                    if n == 0 {
                        return;
                    }
                    seen.extend_from_slice(&buf[..n]);
                    if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                stream
                    .write_all(response.as_bytes())
                    .await
                    .expect("write response");
            }
        });

        addr
    }

    fn handler_with_timeout(timeout: Duration) -> DirectHandler {
        DirectHandler::new(
            SocketProvider::new(4),
            HandlerSettings::new().with_timeout(timeout),
        )
    }

    fn url_at(addr: std::net::SocketAddr, path: &str) -> Url {
        Url::parse(&format!("http://{addr}{path}")).expect("valid url")
    }

    #[tokio::test]
    async fn test_send_simple_get() {
        let addr = one_shot_server(vec!["HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"]).await;
        let handler = handler_with_timeout(Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let response = handler
            .send(Request::get(url_at(addr, "/")), &cancel)
            .await
            .expect("send");
        assert!(response.is_success());
        assert_eq!(response.body.text(), "ok");
    }

    #[tokio::test]
    async fn test_keep_alive_reuses_socket() {
        let addr = one_shot_server(vec![
            "HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\na",
            "HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nb",
        ])
        .await;
        let provider = SocketProvider::new(4);
        let handler = DirectHandler::new(Arc::clone(&provider), HandlerSettings::new());
        let cancel = CancellationToken::new();

        let first = handler
            .send(Request::get(url_at(addr, "/1")), &cancel)
            .await
            .expect("first");
        assert_eq!(first.body.text(), "a");
        // Socket still held: only one permit consumed and not returned.
        assert_eq!(provider.available_sockets(), 3);

        let second = handler
            .send(Request::get(url_at(addr, "/2")), &cancel)
            .await
            .expect("second");
        assert_eq!(second.body.text(), "b");
        assert_eq!(provider.available_sockets(), 3);
    }

    #[tokio::test]
    async fn test_connection_close_releases_socket() {
        let addr = one_shot_server(vec![
            "HTTP/1.1 200 OK\r\nContent-Length: 1\r\nConnection: close\r\n\r\nx",
        ])
        .await;
        let provider = SocketProvider::new(4);
        let handler = DirectHandler::new(Arc::clone(&provider), HandlerSettings::new());
        let cancel = CancellationToken::new();

        handler
            .send(Request::get(url_at(addr, "/")), &cancel)
            .await
            .expect("send");
        assert_eq!(provider.available_sockets(), 4);
    }

    #[tokio::test]
    async fn test_refused_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let handler = handler_with_timeout(Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let err = handler
            .send(Request::get(url_at(addr, "/")), &cancel)
            .await
            .expect_err("refused");
        assert!(matches!(err, Error::ConnectionRefused { .. }), "got {err}");
    }

    #[tokio::test]
    async fn test_refused_via_proxy_is_proxy_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let proxy_addr = listener.local_addr().expect("addr");
        drop(listener);

        let settings = HandlerSettings::new()
            .with_proxy(ProxyConfig::new(proxy_addr.ip().to_string(), proxy_addr.port()));
        let handler = DirectHandler::new(SocketProvider::new(4), settings);
        let cancel = CancellationToken::new();

        let url = Url::parse("http://example.com/").expect("valid url");
        let err = handler
            .send(Request::get(url), &cancel)
            .await
            .expect_err("proxy down");
        assert!(matches!(err, Error::ProxyRefused { .. }), "got {err}");
    }

    #[tokio::test]
    async fn test_proxy_credentials_sent_as_authorization() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let proxy_addr = listener.local_addr().expect("addr");
        let (head_tx, head_rx) = tokio::sync::oneshot::channel();

        // Capturing proxy: records the request head, answers 200.
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 4096];
            let mut seen = Vec::new();
            loop {
                let n = stream.read(&mut buf).await.expect("read");
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
                if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
                .await
                .expect("write response");
            let _ = head_tx.send(seen);
        });

        let settings = HandlerSettings::new().with_proxy(
            ProxyConfig::new(proxy_addr.ip().to_string(), proxy_addr.port())
                .with_credentials("user", "secret"),
        );
        let handler = DirectHandler::new(SocketProvider::new(4), settings);
        let url = Url::parse("http://example.com/").expect("valid url");
        handler
            .send(Request::get(url), &CancellationToken::new())
            .await
            .expect("send via proxy");

        let head = String::from_utf8(head_rx.await.expect("head")).expect("utf8");
        assert!(head.starts_with("GET http://example.com/ HTTP/1.1\r\n"));
        assert!(head.contains("Proxy-Authorization: Basic dXNlcjpzZWNyZXQ=\r\n"));
    }

    #[tokio::test]
    async fn test_timeout_is_request_timeout() {
        // Server accepts but never responds.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let handler = handler_with_timeout(Duration::from_millis(50));
        let cancel = CancellationToken::new();

        let err = handler
            .send(Request::get(url_at(addr, "/")), &cancel)
            .await
            .expect_err("stalled");
        assert!(matches!(err, Error::RequestTimeout { .. }), "got {err}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_cancellation_propagates_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let handler = handler_with_timeout(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let err = handler
            .send(Request::get(url_at(addr, "/")), &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, Error::Cancelled), "got {err}");
    }

    #[tokio::test]
    async fn test_https_without_proxy_rejected() {
        let handler = DirectHandler::new(SocketProvider::new(1), HandlerSettings::new());
        let cancel = CancellationToken::new();
        let url = Url::parse("https://example.com/").expect("valid url");

        let err = handler
            .send(Request::get(url), &cancel)
            .await
            .expect_err("no TLS transport");
        assert!(matches!(err, Error::Config { .. }));
    }
}
