//! Retry middleware.
//!
//! Re-sends a request when the inner handler fails with a transient
//! error (connection refused, proxy refused, request timeout). Fatal
//! errors, HTTP error statuses, and cancellation are never retried.
//! When every attempt fails the caller gets [`Error::RetriesExhausted`]
//! wrapping the last transient failure.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::handler::HttpHandler;
use crate::message::{Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// Default number of attempts (first try plus retries).
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

// ============================================================================
// RetryHandler
// ============================================================================

/// Retries transient failures with a fixed delay.
pub struct RetryHandler<H> {
    inner: H,
    attempts: u32,
    delay: Duration,
}

impl<H> RetryHandler<H> {
    /// Wraps `inner` with the default attempt count and delay.
    #[must_use]
    pub fn new(inner: H) -> Self {
        Self::with_policy(inner, DEFAULT_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }

    /// Wraps `inner` with an explicit policy. `attempts` counts the
    /// first try too and is clamped to at least 1.
    #[must_use]
    pub fn with_policy(inner: H, attempts: u32, delay: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            delay,
        }
    }
}

#[async_trait]
impl<H> HttpHandler for RetryHandler<H>
where
    H: HttpHandler,
{
    async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        let mut attempt = 1;
        loop {
            let error = match self.inner.send(request.clone(), cancel).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            if !error.is_transient() || cancel.is_cancelled() {
                return Err(error);
            }
            if attempt >= self.attempts {
                return Err(Error::retries_exhausted(self.attempts, error));
            }

            debug!(attempt, error = %error, "Transient failure, retrying");
            attempt += 1;
            tokio::select! {
                () = tokio::time::sleep(self.delay) => {}
                () = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

// ============================================================================
// Tests
// ============================================================================
