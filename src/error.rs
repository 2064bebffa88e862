//! Error types for the pooled HTTP transport.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use pooled_http::{Result, Error};
//!
//! async fn example(handler: &dyn HttpHandler) -> Result<()> {
//!     let response = handler.send(request, &cancel).await?;
//!     response.ensure_success()?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Transport | [`Error::ConnectionRefused`], [`Error::ProxyRefused`], [`Error::ConnectionClosed`] |
//! | Timing | [`Error::RequestTimeout`], [`Error::ReceiveTimeout`], [`Error::Cancelled`] |
//! | Protocol | [`Error::Wire`], [`Error::Status`], [`Error::InvalidRedirect`] |
//! | Pool | [`Error::PoolExhausted`], [`Error::RentImbalance`] |
//! | Retry | [`Error::RetriesExhausted`] |
//! | Callback | [`Error::Callback`], [`Error::CallbackSelfTest`] |
//! | External | [`Error::Io`] |
//!
//! # Retry Classification
//!
//! The retry middleware only acts on variants where [`Error::is_transient`]
//! returns `true`: connection-refused, proxy-refused, and request-timeout.
//! [`Error::Cancelled`] is never transient - caller cancellation always
//! propagates immediately. Pool invariant violations are fatal and must
//! propagate unmasked.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::ConnectionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when builder or server configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Transport-level refusal, reset, or incomplete handshake.
    ///
    /// Classified transient - eligible for retry.
    #[error("Connection refused: {message}")]
    ConnectionRefused {
        /// Description of the refusal.
        message: String,
    },

    /// Refusal attributable to the configured proxy.
    ///
    /// Classified transient - eligible for retry, tracked separately
    /// in statistics.
    #[error("Proxy refused: {message}")]
    ProxyRefused {
        /// Description of the refusal.
        message: String,
    },

    /// Connection closed unexpectedly mid-exchange.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Timing Errors
    // ========================================================================
    /// Configured request timeout elapsed.
    ///
    /// This is the handler's own timeout, not caller cancellation.
    /// Classified transient - eligible for retry.
    #[error("Request timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Callback receive timeout elapsed with no delivered request.
    #[error("Receive timed out after {timeout_ms}ms")]
    ReceiveTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The caller cancelled the operation.
    ///
    /// Always propagated immediately, never retried, never counted
    /// as a statistics failure.
    #[error("Operation cancelled by caller")]
    Cancelled,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed data received from the peer.
    #[error("Wire error: {message}")]
    Wire {
        /// Description of the wire violation.
        message: String,
    },

    /// Non-2xx status surfaced by `ensure_success`.
    ///
    /// Not retried by this layer.
    #[error("HTTP status {status} {reason} for {url}")]
    Status {
        /// Response status code.
        status: u16,
        /// Reason phrase (canonical if the server sent none).
        reason: String,
        /// Originating request URL.
        url: String,
    },

    /// A redirect response carried an unusable `Location` header.
    #[error("Invalid redirect location: {location}")]
    InvalidRedirect {
        /// The unusable location value.
        location: String,
    },

    // ========================================================================
    // Pool Errors
    // ========================================================================
    /// Could not rent a connection even after one recreate attempt.
    ///
    /// Fatal - signals systemic resource exhaustion, not retried.
    #[error("Pool exhausted: {message}")]
    PoolExhausted {
        /// Description of the exhaustion.
        message: String,
    },

    /// Rent/return accounting went below zero.
    ///
    /// Fatal - indicates a programming error, must propagate unmasked.
    #[error("Rent imbalance on {connection_id}: returned more than rented")]
    RentImbalance {
        /// The connection whose accounting broke.
        connection_id: ConnectionId,
    },

    // ========================================================================
    // Retry Errors
    // ========================================================================
    /// All retry attempts were exhausted.
    ///
    /// Wraps the last underlying cause.
    #[error("All {attempts} attempts failed, last error: {last}")]
    RetriesExhausted {
        /// Number of attempts performed.
        attempts: u32,
        /// The failure of the final attempt.
        #[source]
        last: Box<Error>,
    },

    // ========================================================================
    // Callback Errors
    // ========================================================================
    /// Callback server failure.
    #[error("Callback error: {message}")]
    Callback {
        /// Description of the callback failure.
        message: String,
    },

    /// The startup loopback self-test did not complete in time.
    ///
    /// The server is not advertised when this is returned.
    #[error("Callback self-test failed after {timeout_ms}ms")]
    CallbackSelfTest {
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection-refused error.
    #[inline]
    pub fn connection_refused(message: impl Into<String>) -> Self {
        Self::ConnectionRefused {
            message: message.into(),
        }
    }

    /// Creates a proxy-refused error.
    #[inline]
    pub fn proxy_refused(message: impl Into<String>) -> Self {
        Self::ProxyRefused {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(timeout_ms: u64) -> Self {
        Self::RequestTimeout { timeout_ms }
    }

    /// Creates a receive timeout error.
    #[inline]
    pub fn receive_timeout(timeout_ms: u64) -> Self {
        Self::ReceiveTimeout { timeout_ms }
    }

    /// Creates a wire error.
    #[inline]
    pub fn wire(message: impl Into<String>) -> Self {
        Self::Wire {
            message: message.into(),
        }
    }

    /// Creates a status error.
    #[inline]
    pub fn status(status: u16, reason: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Status {
            status,
            reason: reason.into(),
            url: url.into(),
        }
    }

    /// Creates an invalid redirect error.
    #[inline]
    pub fn invalid_redirect(location: impl Into<String>) -> Self {
        Self::InvalidRedirect {
            location: location.into(),
        }
    }

    /// Creates a pool exhaustion error.
    #[inline]
    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            message: message.into(),
        }
    }

    /// Creates a rent imbalance error.
    #[inline]
    pub fn rent_imbalance(connection_id: ConnectionId) -> Self {
        Self::RentImbalance { connection_id }
    }

    /// Creates a retries-exhausted error wrapping the last cause.
    #[inline]
    pub fn retries_exhausted(attempts: u32, last: Error) -> Self {
        Self::RetriesExhausted {
            attempts,
            last: Box::new(last),
        }
    }

    /// Creates a callback error.
    #[inline]
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback {
            message: message.into(),
        }
    }

    /// Creates a callback self-test error.
    #[inline]
    pub fn callback_self_test(timeout_ms: u64) -> Self {
        Self::CallbackSelfTest { timeout_ms }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this failure is transient.
    ///
    /// Transient failures are the only ones the retry middleware acts on:
    /// connection-refused, proxy-refused, and request-timeout. Caller
    /// cancellation is never transient.
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. }
                | Self::ProxyRefused { .. }
                | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. } | Self::ReceiveTimeout { .. }
        )
    }

    /// Returns `true` if this is a transport-level connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. }
                | Self::ProxyRefused { .. }
                | Self::ConnectionClosed
                | Self::Io(_)
        )
    }

    /// Returns `true` if this is a fatal pool invariant violation.
    ///
    /// Fatal errors must propagate unmasked through every middleware layer.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. } | Self::RentImbalance { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection_refused("no listener on port 80");
        assert_eq!(
            err.to_string(),
            "Connection refused: no listener on port 80"
        );
    }

    #[test]
    fn test_status_display() {
        let err = Error::status(404, "Not Found", "http://example.com/missing");
        assert_eq!(
            err.to_string(),
            "HTTP status 404 Not Found for http://example.com/missing"
        );
    }

    #[test]
    fn test_is_transient() {
        assert!(Error::connection_refused("x").is_transient());
        assert!(Error::proxy_refused("x").is_transient());
        assert!(Error::request_timeout(1000).is_transient());

        assert!(!Error::Cancelled.is_transient());
        assert!(!Error::status(500, "err", "http://x/").is_transient());
        assert!(!Error::pool_exhausted("x").is_transient());
    }

    #[test]
    fn test_cancelled_never_transient() {
        // Caller cancellation must propagate, never retry.
        let err = Error::Cancelled;
        assert!(!err.is_transient());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::request_timeout(5000).is_timeout());
        assert!(Error::receive_timeout(5000).is_timeout());
        assert!(!Error::connection_refused("x").is_timeout());
    }

    #[test]
    fn test_is_fatal() {
        assert!(Error::pool_exhausted("cannot rent").is_fatal());
        assert!(Error::rent_imbalance(ConnectionId::next()).is_fatal());
        assert!(!Error::request_timeout(10).is_fatal());
    }

    #[test]
    fn test_retries_exhausted_wraps_last_cause() {
        let err = Error::retries_exhausted(3, Error::connection_refused("still down"));
        let text = err.to_string();
        assert!(text.contains("3 attempts"));
        assert!(text.contains("still down"));

        let Error::RetriesExhausted { last, .. } = err else {
            panic!("wrong variant");
        };
        assert!(last.is_transient());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionReset, "reset by peer");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_connection_error());
    }
}
