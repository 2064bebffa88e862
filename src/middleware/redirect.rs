//! Redirect-following middleware.
//!
//! Follows 301, 302, 307, and 308 responses that carry a `Location`
//! header, resolving relative locations against the URL that produced
//! the response. Method, headers, and body are preserved on every hop.
//! 303 is deliberately not followed; callers that want see-other
//! semantics handle it themselves.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::handler::HttpHandler;
use crate::message::{Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// Maximum redirect hops before giving up.
pub const MAX_REDIRECT_HOPS: u32 = 16;

// ============================================================================
// RedirectHandler
// ============================================================================

/// Follows redirect chains up to a hop limit.
pub struct RedirectHandler<H> {
    inner: H,
    max_hops: u32,
}

impl<H> RedirectHandler<H> {
    /// Wraps `inner` with the default hop limit.
    #[must_use]
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            max_hops: MAX_REDIRECT_HOPS,
        }
    }

    /// Wraps `inner` with an explicit hop limit.
    #[must_use]
    pub fn with_max_hops(inner: H, max_hops: u32) -> Self {
        Self { inner, max_hops }
    }
}

fn is_followed(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

#[async_trait]
impl<H> HttpHandler for RedirectHandler<H>
where
    H: HttpHandler,
{
    async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        let mut current = request;
        let mut hops = 0;
        loop {
            let response = self.inner.send(current.clone(), cancel).await?;
            if !is_followed(response.status) {
                return Ok(response);
            }
            let Some(location) = response.header("location") else {
                // Redirect status without a target is final.
                return Ok(response);
            };

            if hops >= self.max_hops {
                return Err(Error::invalid_redirect(format!(
                    "{location} (redirect limit of {} hops reached)",
                    self.max_hops
                )));
            }

            let target = response
                .url
                .join(location)
                .map_err(|_| Error::invalid_redirect(location))?;
            debug!(
                status = response.status.as_u16(),
                from = %response.url,
                to = %target,
                "Following redirect"
            );

            hops += 1;
            current.url = target;
        }
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

// ============================================================================
// Tests
// ============================================================================
