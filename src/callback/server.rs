//! Out-of-band HTTP callback server.
//!
//! A minimal HTTP/1.1 listener that accepts callback requests from
//! external services and routes them, by longest path prefix, to
//! in-process receivers. Every inbound request is answered `200 OK`,
//! matched or not, so remote services never see an error surface.
//!
//! Startup is fail-closed: `start` performs a loopback self-test (a GET
//! through the advertised URL back into the listener) and refuses to
//! hand out the server when the probe does not complete in time. A
//! misconfigured external URL therefore fails at startup, not at the
//! first missed callback.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use http::Method;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::callback::receiver::CallbackRegistration;
use crate::error::{Error, Result};
use crate::handler::wire;
use crate::message::{Body, Request};

// ============================================================================
// Constants
// ============================================================================

/// Accept poll interval; the loop checks the shutdown flag this often.
const ACCEPT_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum accepted inbound head size.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Maximum accepted inbound body size.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Default self-test budget.
pub const DEFAULT_SELF_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Canned reply for every inbound request.
const OK_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

// ============================================================================
// CallbackServerConfig
// ============================================================================

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct CallbackServerConfig {
    /// Address to bind. Port 0 picks a free port.
    pub bind_addr: SocketAddr,

    /// Base URL external services reach the listener at. `None` derives
    /// `http://{local_addr}/`, which only works for loopback callers.
    pub external_url: Option<Url>,

    /// Budget for the startup loopback self-test.
    pub self_test_timeout: Duration,
}

impl Default for CallbackServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            external_url: None,
            self_test_timeout: DEFAULT_SELF_TEST_TIMEOUT,
        }
    }
}

// ============================================================================
// CallbackServer
// ============================================================================

/// The callback listener. See the module docs for routing semantics.
pub struct CallbackServer {
    external_url: Url,
    local_addr: SocketAddr,
    routes: Mutex<FxHashMap<String, mpsc::UnboundedSender<Request>>>,
    shutdown: AtomicBool,
}

impl std::fmt::Debug for CallbackServer {
    // Registered paths are capability tokens and stay out of output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackServer")
            .field("external_url", &self.external_url.as_str())
            .field("local_addr", &self.local_addr)
            .field("routes", &self.routes.lock().len())
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// CallbackServer - Constructor
// ============================================================================

impl CallbackServer {
    /// Binds, starts accepting, and runs the loopback self-test.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] when the bind fails
    /// - [`Error::CallbackSelfTest`] when the probe times out
    /// - [`Error::Callback`] when the probe fails outright
    pub async fn start(config: CallbackServerConfig) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let external_url = match config.external_url {
            Some(url) => url,
            None => Url::parse(&format!("http://{local_addr}/"))
                .map_err(|e| Error::callback(format!("cannot derive external URL: {e}")))?,
        };

        let server = Arc::new(Self {
            external_url,
            local_addr,
            routes: Mutex::new(FxHashMap::default()),
            shutdown: AtomicBool::new(false),
        });

        let accept_server = Arc::clone(&server);
        tokio::spawn(async move {
            accept_server.accept_loop(listener).await;
        });

        if let Err(err) = server.self_test(config.self_test_timeout).await {
            server.shutdown();
            return Err(err);
        }

        info!(addr = %local_addr, external = %server.external_url, "Callback server ready");
        Ok(server)
    }
}

// ============================================================================
// CallbackServer - Public API
// ============================================================================

impl CallbackServer {
    /// The address actually bound.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The advertised base URL.
    #[inline]
    #[must_use]
    pub fn external_url(&self) -> &Url {
        &self.external_url
    }

    /// Allocates a fresh callback namespace under `/cb/{uuid}`.
    #[must_use]
    pub fn register(self: &Arc<Self>) -> CallbackRegistration {
        let base_path = format!("/cb/{}", Uuid::new_v4().simple());
        CallbackRegistration::new(Arc::clone(self), base_path)
    }

    /// Stops accepting and drops every route.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.routes.lock().clear();
    }
}

// ============================================================================
// CallbackServer - Routing
// ============================================================================

impl CallbackServer {
    pub(crate) fn insert_route(&self, path: String, sender: mpsc::UnboundedSender<Request>) {
        self.routes.lock().insert(path, sender);
    }

    pub(crate) fn remove_route(&self, path: &str) {
        self.routes.lock().remove(path);
    }

    pub(crate) fn remove_routes_with_prefix(&self, prefix: &str) {
        self.routes.lock().retain(|path, _| !path.starts_with(prefix));
    }

    /// Longest registered prefix of `path`, if any.
    fn route(&self, path: &str) -> Option<mpsc::UnboundedSender<Request>> {
        let routes = self.routes.lock();
        routes
            .iter()
            .filter(|(registered, _)| path.starts_with(registered.as_str()))
            .max_by_key(|(registered, _)| registered.len())
            .map(|(_, sender)| sender.clone())
    }
}

// ============================================================================
// CallbackServer - Accept Loop
// ============================================================================

impl CallbackServer {
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                debug!("Callback accept loop stopping");
                return;
            }
            match timeout(ACCEPT_TIMEOUT, listener.accept()).await {
                Err(_) => {} // poll again, re-check shutdown
                Ok(Err(err)) => warn!(error = %err, "Callback accept failed"),
                Ok(Ok((stream, peer))) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(err) = server.handle_connection(stream).await {
                            debug!(peer = %peer, error = %err, "Callback connection failed");
                        }
                    });
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let request = self.read_inbound(&mut stream).await?;
        let path = request.url.path().to_owned();

        match self.route(&path) {
            Some(sender) => {
                // A closed receiver is indistinguishable from no route.
                if sender.send(request).is_err() {
                    debug!(path = %path, "Callback receiver gone, dropping request");
                }
            }
            None => debug!(path = %path, "Unmatched callback path"),
        }

        // Always 200: external services must never observe routing.
        stream.write_all(OK_RESPONSE).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Parses one inbound HTTP/1.1 request.
    async fn read_inbound(&self, stream: &mut TcpStream) -> Result<Request> {
        let mut buf = BytesMut::with_capacity(1024);

        loop {
            let mut headers = [httparse::EMPTY_HEADER; 64];
            let mut parser = httparse::Request::new(&mut headers);
            match parser.parse(&buf) {
                Ok(httparse::Status::Complete(head_len)) => {
                    let method = parser
                        .method
                        .and_then(|m| Method::try_from(m).ok())
                        .ok_or_else(|| Error::wire("inbound request without method"))?;
                    let path = parser
                        .path
                        .ok_or_else(|| Error::wire("inbound request without path"))?;
                    let url = self
                        .external_url
                        .join(path)
                        .map_err(|_| Error::wire(format!("unusable inbound path {path:?}")))?;

                    let mut request = Request::new(method, url);
                    let mut content_length = 0usize;
                    for header in parser.headers.iter() {
                        if header.name.eq_ignore_ascii_case("content-length") {
                            content_length = std::str::from_utf8(header.value)
                                .ok()
                                .and_then(|v| v.trim().parse().ok())
                                .ok_or_else(|| Error::wire("bad inbound Content-Length"))?;
                        }
                        if let (Ok(name), Ok(value)) = (
                            http::header::HeaderName::try_from(header.name),
                            http::header::HeaderValue::from_bytes(header.value),
                        ) {
                            request.headers.append(name, value);
                        }
                    }
                    if content_length > MAX_BODY_BYTES {
                        return Err(Error::wire("inbound callback body too large"));
                    }

                    let _ = buf.split_to(head_len);
                    while buf.len() < content_length {
                        if stream.read_buf(&mut buf).await? == 0 {
                            return Err(Error::ConnectionClosed);
                        }
                    }
                    if content_length > 0 {
                        request.body = Some(Body::from(buf.split_to(content_length).freeze()));
                    }
                    return Ok(request);
                }
                Ok(httparse::Status::Partial) => {
                    if buf.len() > MAX_HEAD_BYTES {
                        return Err(Error::wire("inbound callback head too large"));
                    }
                    if stream.read_buf(&mut buf).await? == 0 {
                        return Err(Error::ConnectionClosed);
                    }
                }
                Err(err) => return Err(Error::wire(format!("bad inbound request: {err}"))),
            }
        }
    }
}

// ============================================================================
// CallbackServer - Self-Test
// ============================================================================

impl CallbackServer {
    /// Sends a GET through the advertised URL back into the listener
    /// and waits for it to arrive on a probe route.
    async fn self_test(&self, budget: Duration) -> Result<()> {
        let probe_path = format!("/cb/probe-{}", Uuid::new_v4().simple());
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.insert_route(probe_path.clone(), tx);

        let outcome = timeout(budget, self.probe(&probe_path, &mut rx)).await;
        self.remove_route(&probe_path);

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(Error::callback(format!("self-test failed: {err}"))),
            Err(_) => Err(Error::callback_self_test(budget.as_millis() as u64)),
        }
    }

    async fn probe(
        &self,
        probe_path: &str,
        rx: &mut mpsc::UnboundedReceiver<Request>,
    ) -> Result<()> {
        let url = self
            .external_url
            .join(probe_path)
            .map_err(|e| Error::callback(format!("bad probe URL: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::callback("external URL has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::callback("external URL has no port"))?;

        let mut stream = TcpStream::connect((host, port)).await?;
        let request = Request::get(url.clone());
        wire::write_request(&mut stream, &request, None).await?;
        let (response, _) = wire::read_response(&mut stream, &url).await?;
        if !response.is_success() {
            return Err(Error::callback(format!(
                "probe answered {}",
                response.status
            )));
        }

        rx.recv()
            .await
            .ok_or_else(|| Error::callback("probe route closed"))?;
        Ok(())
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

// ============================================================================
// Tests
// ============================================================================
