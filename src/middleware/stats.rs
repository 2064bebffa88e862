//! Statistics middleware.
//!
//! Counts every physical attempt that passes through it, so it sits
//! innermost in the chain, directly above the pooled handler. Retried
//! attempts and redirect hops each count once. Caller cancellation is
//! not a failure and is not counted as one.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::handler::HttpHandler;
use crate::message::{Request, Response};

// ============================================================================
// TransportStats
// ============================================================================

/// Live transport counters. All loads/stores are relaxed; the numbers
/// are diagnostics, not synchronization.
#[derive(Debug, Default)]
pub struct TransportStats {
    requests: AtomicU64,
    responses: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    elapsed_ms: AtomicU64,
    timeout_failures: AtomicU64,
    proxy_failures: AtomicU64,
    other_failures: AtomicU64,
}

impl TransportStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Takes a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            elapsed_ms: self.elapsed_ms.load(Ordering::Relaxed),
            timeout_failures: self.timeout_failures.load(Ordering::Relaxed),
            proxy_failures: self.proxy_failures.load(Ordering::Relaxed),
            other_failures: self.other_failures.load(Ordering::Relaxed),
        }
    }

    fn record_request(&self, request: &Request) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(
            (request.head_len() + request.body_len()) as u64,
            Ordering::Relaxed,
        );
    }

    fn record_response(&self, response: &Response, elapsed_ms: u64) {
        self.responses.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(
            (response.head_len() + response.body.len()) as u64,
            Ordering::Relaxed,
        );
        self.elapsed_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    fn record_failure(&self, error: &Error, elapsed_ms: u64) {
        self.elapsed_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        match error {
            // Cancellation is the caller's decision, not a failure.
            Error::Cancelled => {}
            Error::RequestTimeout { .. } | Error::ReceiveTimeout { .. } => {
                self.timeout_failures.fetch_add(1, Ordering::Relaxed);
            }
            Error::ProxyRefused { .. } => {
                self.proxy_failures.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.other_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

// ============================================================================
// StatsSnapshot
// ============================================================================

/// Point-in-time copy of the counters, serializable for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Physical request attempts started.
    pub requests: u64,
    /// Responses received.
    pub responses: u64,
    /// Approximate bytes of request heads and bodies.
    pub bytes_sent: u64,
    /// Approximate bytes of response heads and bodies.
    pub bytes_received: u64,
    /// Total wall time spent in attempts, milliseconds.
    pub elapsed_ms: u64,
    /// Attempts ended by a timeout.
    pub timeout_failures: u64,
    /// Attempts refused by the proxy.
    pub proxy_failures: u64,
    /// Attempts failed any other way (cancellation excluded).
    pub other_failures: u64,
}

// ============================================================================
// StatsHandler
// ============================================================================

/// Records counters around the inner handler.
pub struct StatsHandler<H> {
    inner: H,
    stats: Arc<TransportStats>,
}

impl<H> StatsHandler<H> {
    /// Wraps `inner`, recording into `stats`.
    #[must_use]
    pub fn new(inner: H, stats: Arc<TransportStats>) -> Self {
        Self { inner, stats }
    }

    /// The shared counters.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &Arc<TransportStats> {
        &self.stats
    }
}

#[async_trait]
impl<H> HttpHandler for StatsHandler<H>
where
    H: HttpHandler,
{
    async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        self.stats.record_request(&request);
        let started = Instant::now();

        let result = self.inner.send(request, cancel).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(response) => self.stats.record_response(response, elapsed_ms),
            Err(error) => self.stats.record_failure(error, elapsed_ms),
        }
        result
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

// ============================================================================
// Tests
// ============================================================================
