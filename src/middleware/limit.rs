//! Concurrency limiting middleware.
//!
//! Caps the number of requests in flight through the inner handler.
//! Callers past the cap queue on a semaphore and wake FIFO; a queued
//! caller whose cancellation token fires leaves the queue immediately.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::handler::HttpHandler;
use crate::message::{Request, Response};

// ============================================================================
// LimitHandler
// ============================================================================

/// Bounds in-flight requests through the inner handler.
pub struct LimitHandler<H> {
    inner: H,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl<H> LimitHandler<H> {
    /// Wraps `inner` with a cap of `max_concurrent` in-flight requests.
    #[must_use]
    pub fn new(inner: H, max_concurrent: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// The configured cap.
    #[inline]
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Requests that could start right now without queueing.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[async_trait]
impl<H> HttpHandler for LimitHandler<H>
where
    H: HttpHandler,
{
    async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        let _permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            permit = self.semaphore.acquire() => {
                // The semaphore is never closed while the handler lives.
                permit.map_err(|_| Error::pool_exhausted("request limiter closed"))?
            }
        };
        self.inner.send(request, cancel).await
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

// ============================================================================
// Tests
// ============================================================================
