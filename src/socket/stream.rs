//! Admission-counted, optionally instrumented TCP socket.
//!
//! A [`PooledSocket`] owns the TCP stream together with the admission
//! permit that allowed its creation; dropping the socket returns the
//! permit to the provider. When byte counters are attached, every read
//! and write is recorded with relaxed atomics.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;

// ============================================================================
// ByteCounters
// ============================================================================

/// Transport-level byte totals.
///
/// Shared across all sockets of one provider. Relaxed ordering is
/// sufficient - readers only want approximate running totals.
#[derive(Debug, Default)]
pub struct ByteCounters {
    /// Total bytes written to sockets.
    sent: AtomicU64,
    /// Total bytes read from sockets.
    received: AtomicU64,
}

impl ByteCounters {
    /// Creates zeroed counters.
    #[inline]
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns total bytes sent.
    #[inline]
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Returns total bytes received.
    #[inline]
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    #[inline]
    fn record_sent(&self, n: u64) {
        self.sent.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    fn record_received(&self, n: u64) {
        self.received.fetch_add(n, Ordering::Relaxed);
    }
}

// ============================================================================
// PooledSocket
// ============================================================================

/// A TCP stream bound to one admission permit.
///
/// Implements [`AsyncRead`] and [`AsyncWrite`] by delegating to the
/// inner stream, recording byte counts when instrumented.
#[derive(Debug)]
pub struct PooledSocket {
    /// The underlying stream.
    stream: TcpStream,
    /// Admission permit, released on drop.
    _permit: OwnedSemaphorePermit,
    /// Optional byte instrumentation.
    counters: Option<Arc<ByteCounters>>,
}

impl PooledSocket {
    /// Wraps a connected stream with its admission permit.
    pub(crate) fn new(
        stream: TcpStream,
        permit: OwnedSemaphorePermit,
        counters: Option<Arc<ByteCounters>>,
    ) -> Self {
        Self {
            stream,
            _permit: permit,
            counters,
        }
    }

    /// Returns the peer address, if still available.
    #[inline]
    #[must_use]
    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.stream.peer_addr().ok()
    }
}

// ============================================================================
// PooledSocket - IO Implementations
// ============================================================================

impl AsyncRead for PooledSocket {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let result = Pin::new(&mut self.stream).poll_read(cx, buf);

        if let (Poll::Ready(Ok(())), Some(counters)) = (&result, &self.counters) {
            let n = buf.filled().len() - before;
            counters.record_received(n as u64);
        }

        result
    }
}

impl AsyncWrite for PooledSocket {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let result = Pin::new(&mut self.stream).poll_write(cx, buf);

        if let (Poll::Ready(Ok(n)), Some(counters)) = (&result, &self.counters) {
            counters.record_sent(*n as u64);
        }

        result
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Semaphore;

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let client = TcpStream::connect(addr).await.expect("connect");
        let (server, _) = listener.accept().await.expect("accept");
        (client, server)
    }

    #[tokio::test]
    async fn test_byte_counters_record_traffic() {
        let (client, mut server) = socket_pair().await;

        let semaphore = Arc::new(Semaphore::new(1));
        let permit = semaphore.clone().acquire_owned().await.expect("permit");
        let counters = ByteCounters::new();
        let mut socket = PooledSocket::new(client, permit, Some(Arc::clone(&counters)));

        socket.write_all(b"ping").await.expect("write");
        socket.flush().await.expect("flush");

        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.expect("server read");
        server.write_all(b"pong!").await.expect("server write");

        let mut buf = [0u8; 5];
        socket.read_exact(&mut buf).await.expect("read");

        assert_eq!(counters.sent(), 4);
        assert_eq!(counters.received(), 5);
    }

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let (client, _server) = socket_pair().await;

        let semaphore = Arc::new(Semaphore::new(1));
        let permit = semaphore.clone().acquire_owned().await.expect("permit");
        let socket = PooledSocket::new(client, permit, None);

        assert_eq!(semaphore.available_permits(), 0);
        drop(socket);
        assert_eq!(semaphore.available_permits(), 1);
    }
}
