//! Transport assembly.
//!
//! [`TransportBuilder`] validates its configuration and composes the
//! middleware chain around a pooled handler:
//!
//! ```text
//! Limit → Retry → Redirect → Cookies → Compression → Stats → Pooled
//! ```
//!
//! The result is a [`Transport`]: one handler plus accessors for the
//! shared cookie jar, statistics, and the pool it rents from.
//!
//! # Example
//!
//! ```no_run
//! use pooled_http::{Request, TransportBuilder};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! # async fn example() -> pooled_http::Result<()> {
//! let transport = TransportBuilder::new()
//!     .max_sockets(32)
//!     .retries(3, std::time::Duration::from_millis(250))
//!     .build()?;
//!
//! let url = Url::parse("http://example.com/").expect("valid url");
//! let response = transport
//!     .send(Request::get(url), &CancellationToken::new())
//!     .await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Error, Result};
use crate::handler::{DirectHandlerFactory, HandlerFactory, HandlerSettings, HttpHandler};
use crate::message::{Request, Response};
use crate::middleware::{
    CompressionHandler, CookieHandler, CookieJar, LimitHandler, RedirectHandler, RetryHandler,
    StatsHandler, TransportStats,
};
use crate::middleware::{DEFAULT_ATTEMPTS, DEFAULT_RETRY_DELAY, MAX_REDIRECT_HOPS};
use crate::pool::{Pool, PoolMode, PooledHandler, RegistryConfig};
use crate::socket::{DEFAULT_MAX_SOCKETS, SocketProvider};

// ============================================================================
// TransportBuilder
// ============================================================================

/// Fluent configuration for a [`Transport`].
pub struct TransportBuilder {
    max_sockets: usize,
    max_concurrent: Option<usize>,
    pool_mode: PoolMode,
    settings: HandlerSettings,
    registry: RegistryConfig,
    factory: Option<Arc<dyn HandlerFactory>>,
    retry_attempts: u32,
    retry_delay: Duration,
    max_redirects: u32,
    cookie_jar: Option<Arc<CookieJar>>,
    decompress: bool,
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TransportBuilder - Constructor
// ============================================================================

impl TransportBuilder {
    /// Creates a builder with defaults: 64 sockets, exclusive pooling,
    /// 3 retry attempts, 16 redirect hops, decompression on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_sockets: DEFAULT_MAX_SOCKETS,
            max_concurrent: None,
            pool_mode: PoolMode::Exclusive,
            settings: HandlerSettings::default(),
            registry: RegistryConfig::default(),
            factory: None,
            retry_attempts: DEFAULT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_redirects: MAX_REDIRECT_HOPS,
            cookie_jar: None,
            decompress: true,
        }
    }
}

// ============================================================================
// TransportBuilder - Configuration
// ============================================================================

impl TransportBuilder {
    /// Caps simultaneously open sockets.
    #[must_use]
    pub fn max_sockets(mut self, max_sockets: usize) -> Self {
        self.max_sockets = max_sockets;
        self
    }

    /// Caps requests in flight. Unset means no cap beyond the sockets.
    #[must_use]
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = Some(max_concurrent);
        self
    }

    /// Chooses the connection sharing policy.
    #[must_use]
    pub fn pool_mode(mut self, mode: PoolMode) -> Self {
        self.pool_mode = mode;
        self
    }

    /// Initial handler settings (proxy, TLS validation, timeout).
    #[must_use]
    pub fn settings(mut self, settings: HandlerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Eviction sweep tuning.
    #[must_use]
    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }

    /// Replaces the direct TCP transport with a custom factory.
    #[must_use]
    pub fn handler_factory(mut self, factory: Arc<dyn HandlerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Retry policy. `attempts` counts the first try; 1 disables retry.
    #[must_use]
    pub fn retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    /// Redirect hop limit. 0 disables redirect following.
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Shares an existing cookie jar instead of creating a fresh one.
    #[must_use]
    pub fn cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    /// Enables or disables transparent response decompression.
    #[must_use]
    pub fn decompress(mut self, decompress: bool) -> Self {
        self.decompress = decompress;
        self
    }
}

// ============================================================================
// TransportBuilder - Build
// ============================================================================

impl TransportBuilder {
    /// Validates the configuration and assembles the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero socket or concurrency cap,
    /// or a zero retry attempt count.
    pub fn build(self) -> Result<Transport> {
        if self.max_sockets == 0 {
            return Err(Error::config("max_sockets must be at least 1"));
        }
        if self.max_concurrent == Some(0) {
            return Err(Error::config("max_concurrent must be at least 1"));
        }
        if self.retry_attempts == 0 {
            return Err(Error::config("retry attempts must be at least 1"));
        }

        let provider = SocketProvider::new(self.max_sockets);
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(DirectHandlerFactory::new(Arc::clone(&provider))));
        let pool = Pool::start(factory, provider, self.registry, self.pool_mode);

        let stats = TransportStats::new();
        let jar = self.cookie_jar.unwrap_or_else(CookieJar::new);

        let mut chain: Arc<dyn HttpHandler> = Arc::new(PooledHandler::new(
            Arc::clone(&pool),
            self.settings.clone(),
        ));
        chain = Arc::new(StatsHandler::new(chain, Arc::clone(&stats)));
        if self.decompress {
            chain = Arc::new(CompressionHandler::new(chain));
        }
        chain = Arc::new(CookieHandler::new(chain, Arc::clone(&jar)));
        if self.max_redirects > 0 {
            chain = Arc::new(RedirectHandler::with_max_hops(chain, self.max_redirects));
        }
        if self.retry_attempts > 1 {
            chain = Arc::new(RetryHandler::with_policy(
                chain,
                self.retry_attempts,
                self.retry_delay,
            ));
        }
        if let Some(max_concurrent) = self.max_concurrent {
            chain = Arc::new(LimitHandler::new(chain, max_concurrent));
        }

        info!(
            max_sockets = self.max_sockets,
            mode = ?self.pool_mode,
            "Transport assembled"
        );
        Ok(Transport {
            handler: chain,
            pool,
            stats,
            jar,
        })
    }
}

// ============================================================================
// Transport
// ============================================================================

/// An assembled middleware chain over a connection pool.
pub struct Transport {
    handler: Arc<dyn HttpHandler>,
    pool: Arc<Pool>,
    stats: Arc<TransportStats>,
    jar: Arc<CookieJar>,
}

impl Transport {
    /// Sends a request through the full chain.
    pub async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        self.handler.send(request, cancel).await
    }

    /// The chain as a handler, for callers composing further.
    #[inline]
    #[must_use]
    pub fn handler(&self) -> Arc<dyn HttpHandler> {
        Arc::clone(&self.handler)
    }

    /// The pool behind the chain.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    /// Shared transport counters.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &Arc<TransportStats> {
        &self.stats
    }

    /// Shared cookie jar.
    #[inline]
    #[must_use]
    pub fn cookie_jar(&self) -> &Arc<CookieJar> {
        &self.jar
    }

    /// Stops the eviction sweep and disposes idle connections.
    pub fn shutdown(&self) {
        self.handler.dispose();
        self.pool.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use http::StatusCode;
    use url::Url;

    struct NoopHandler;

    #[async_trait]
    impl HttpHandler for NoopHandler {
        async fn send(&self, request: Request, _cancel: &CancellationToken) -> Result<Response> {
            Ok(Response::new(request.url, StatusCode::OK))
        }
    }

    struct NoopFactory;

    impl HandlerFactory for NoopFactory {
        fn create(&self, _settings: &HandlerSettings) -> Result<Arc<dyn HttpHandler>> {
            Ok(Arc::new(NoopHandler))
        }
    }

    #[test]
    fn test_rejects_zero_caps() {
        assert!(TransportBuilder::new().max_sockets(0).build().is_err());
        assert!(TransportBuilder::new().max_concurrent(0).build().is_err());
        assert!(
            TransportBuilder::new()
                .retries(0, Duration::from_millis(1))
                .build()
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_full_chain_send() {
        let transport = TransportBuilder::new()
            .handler_factory(Arc::new(NoopFactory))
            .max_concurrent(4)
            .build()
            .expect("build");

        let url = Url::parse("http://example.com/").expect("valid url");
        let response = transport
            .send(Request::get(url), &CancellationToken::new())
            .await
            .expect("send");
        assert!(response.is_success());

        let snapshot = transport.stats().snapshot();
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.responses, 1);

        transport.shutdown();
        assert_eq!(transport.pool().registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_shared_jar_across_transports() {
        let jar = CookieJar::new();
        let first = TransportBuilder::new()
            .handler_factory(Arc::new(NoopFactory))
            .cookie_jar(Arc::clone(&jar))
            .build()
            .expect("build");
        let second = TransportBuilder::new()
            .handler_factory(Arc::new(NoopFactory))
            .cookie_jar(Arc::clone(&jar))
            .build()
            .expect("build");

        assert!(Arc::ptr_eq(first.cookie_jar(), second.cookie_jar()));
    }
}
