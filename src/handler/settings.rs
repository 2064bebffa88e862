//! Handler settings and proxy configuration.
//!
//! [`HandlerSettings`] is the immutable, comparable tuple that partitions
//! the pool: one physical connection is configured exactly once with one
//! settings value, so two handlers with different proxy/TLS/timeout
//! configurations never share a connection.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ProxyCredentials
// ============================================================================

/// Username/password pair for proxy authorization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyCredentials {
    /// Proxy username.
    pub username: String,
    /// Proxy password.
    pub password: String,
}

// ============================================================================
// ProxyConfig
// ============================================================================

/// HTTP proxy configuration.
///
/// Requests travel to the proxy in absolute form; the proxy dials the
/// origin. Credentials, when present, are sent as
/// `Proxy-Authorization: Basic` on every request. Refusals from this
/// address are classified as proxy-refused rather than
/// connection-refused.
///
/// # Example
///
/// ```
/// use pooled_http::ProxyConfig;
///
/// let proxy = ProxyConfig::new("proxy.example.com", 8080)
///     .with_credentials("user", "pass");
/// assert_eq!(proxy.port, 8080);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy hostname.
    pub host: String,

    /// Proxy port.
    pub port: u16,

    /// Optional credentials.
    pub credentials: Option<ProxyCredentials>,
}

impl ProxyConfig {
    /// Creates a proxy configuration without credentials.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
        }
    }

    /// Attaches credentials.
    #[inline]
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(ProxyCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

// ============================================================================
// HandlerSettings
// ============================================================================

/// The pool partition key: proxy, TLS validation, timeout.
///
/// Immutable once applied to a connection. `Eq + Hash` so the pool can
/// keep one map per distinct value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerSettings {
    /// Optional proxy to route through.
    pub proxy: Option<ProxyConfig>,

    /// Whether TLS certificates should be validated.
    ///
    /// Carried for partitioning; the transport itself speaks plain TCP
    /// and delegates TLS to an external layer.
    pub validate_tls: bool,

    /// Per-request timeout applied by the handler.
    pub timeout: Duration,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            proxy: None,
            validate_tls: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// ============================================================================
// HandlerSettings - Builder Methods
// ============================================================================

impl HandlerSettings {
    /// Creates default settings (no proxy, TLS validation on, 30s timeout).
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the proxy.
    #[inline]
    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Sets TLS validation.
    #[inline]
    #[must_use]
    pub fn with_validate_tls(mut self, validate: bool) -> Self {
        self.validate_tls = validate;
        self
    }

    /// Sets the per-request timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
