//! The handler contract.
//!
//! A handler is the unit abstraction of the whole crate: given a request,
//! produce a response or a typed failure. Direct transports, the pooled
//! handler, and every middleware decorator all satisfy this one trait and
//! compose by plain delegation.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::message::{Request, Response};

// ============================================================================
// HttpHandler
// ============================================================================

/// Sends one request, produces one response.
///
/// # Thread Safety
///
/// Implementations must tolerate concurrent `send` calls: pooled shared
/// connections are rented by many callers at once.
///
/// # Cancellation
///
/// `cancel` is the caller's cancellation signal. Implementations must
/// unwind promptly when it fires and return [`Error::Cancelled`]
/// (never a timeout) so upper layers can tell the two apart.
///
/// [`Error::Cancelled`]: crate::Error::Cancelled
#[async_trait]
pub trait HttpHandler: Send + Sync {
    /// Sends the request and waits for the response.
    async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response>;

    /// Releases underlying transport resources (sockets, permits).
    ///
    /// Called when the owning pooled connection is disposed. Default is
    /// a no-op for handlers without long-lived resources.
    fn dispose(&self) {}
}

// ============================================================================
// Blanket Implementations
// ============================================================================

#[async_trait]
impl<H> HttpHandler for Arc<H>
where
    H: HttpHandler + ?Sized,
{
    async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        (**self).send(request, cancel).await
    }

    fn dispose(&self) {
        (**self).dispose();
    }
}

#[async_trait]
impl<H> HttpHandler for Box<H>
where
    H: HttpHandler + ?Sized,
{
    async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        (**self).send(request, cancel).await
    }

    fn dispose(&self) {
        (**self).dispose();
    }
}

// ============================================================================
// Tests
// ============================================================================
