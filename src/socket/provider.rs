//! Socket provider with admission control.
//!
//! The provider creates transport-level connections under a fixed
//! concurrency limit. Its availability numbers
//! ([`SocketProvider::available_sockets`]) drive the registry's
//! pressure-based eviction; the counter is read-mostly and approximate
//! staleness is acceptable there, since the sweep is periodic and
//! self-correcting.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::socket::stream::{ByteCounters, PooledSocket};

// ============================================================================
// Constants
// ============================================================================

/// Default maximum number of concurrently open sockets.
pub const DEFAULT_MAX_SOCKETS: usize = 64;

// ============================================================================
// SocketProvider
// ============================================================================

/// Creates TCP sockets under an admission-control limit.
///
/// Each successful [`connect`](Self::connect) consumes one permit that is
/// held for the socket's whole lifetime; dropping the [`PooledSocket`]
/// returns it. Callers over the limit queue on the semaphore.
#[derive(Debug)]
pub struct SocketProvider {
    /// Admission permits.
    semaphore: Arc<Semaphore>,
    /// Configured maximum.
    max_sockets: usize,
    /// Optional byte-level instrumentation applied to every socket.
    counters: Option<Arc<ByteCounters>>,
}

// ============================================================================
// SocketProvider - Constructors
// ============================================================================

impl SocketProvider {
    /// Creates a provider with the given socket limit.
    #[must_use]
    pub fn new(max_sockets: usize) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(max_sockets)),
            max_sockets,
            counters: None,
        })
    }

    /// Creates a provider whose sockets record byte totals into the
    /// given counters.
    #[must_use]
    pub fn with_counters(max_sockets: usize, counters: Arc<ByteCounters>) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(max_sockets)),
            max_sockets,
            counters: Some(counters),
        })
    }
}

// ============================================================================
// SocketProvider - Public API
// ============================================================================

impl SocketProvider {
    /// Returns the configured maximum number of concurrent sockets.
    #[inline]
    #[must_use]
    pub fn max_sockets(&self) -> usize {
        self.max_sockets
    }

    /// Returns the number of sockets that could be opened right now.
    ///
    /// Approximate under concurrency; eviction logic tolerates staleness.
    #[inline]
    #[must_use]
    pub fn available_sockets(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Opens a TCP connection to `host:port` under the admission limit.
    ///
    /// Blocks while the provider is at capacity until a permit frees up.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionRefused`] if the peer refuses or resets
    /// - [`Error::Cancelled`] if `cancel` fires while queued or connecting
    /// - [`Error::Io`] for other transport failures
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<PooledSocket> {
        let permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| Error::pool_exhausted("socket provider closed"))?
            }
            () = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let stream = tokio::select! {
            result = TcpStream::connect((host, port)) => {
                result.map_err(|e| classify_connect_error(host, port, e))?
            }
            () = cancel.cancelled() => return Err(Error::Cancelled),
        };

        debug!(host, port, available = self.available_sockets(), "Socket opened");

        Ok(PooledSocket::new(stream, permit, self.counters.clone()))
    }
}

// ============================================================================
// Error Classification
// ============================================================================

/// Maps connect-time IO failures onto the transport taxonomy.
///
/// Refusals, resets, and aborted handshakes are transient
/// connection-refused failures; everything else stays an IO error.
fn classify_connect_error(host: &str, port: u16, err: std::io::Error) -> Error {
    match err.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            Error::connection_refused(format!("{host}:{port}: {err}"))
        }
        _ => Error::Io(err),
    }
}

// ============================================================================
// Tests
// ============================================================================
