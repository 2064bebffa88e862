//! The pooled handler: the pool's public face.
//!
//! A [`PooledHandler`] is a lightweight identity over the pool. Each
//! `send` snapshots the handler's current settings, finds the matching
//! partition, rents a connection, and returns it when the send finishes
//! or is cancelled. Settings can change between sends; the handler
//! simply lands in a different partition next time, and the old
//! partition's connection ages out through the sweep.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::handler::{HandlerSettings, HttpHandler, ProxyConfig};
use crate::message::{Request, Response};
use crate::identifiers::HandlerId;
use crate::pool::pool::Pool;

// ============================================================================
// PooledHandler
// ============================================================================

/// A handler identity renting connections from the pool.
pub struct PooledHandler {
    pool: Arc<Pool>,
    settings: Mutex<HandlerSettings>,
    identity: HandlerId,
    closed: AtomicBool,
}

// ============================================================================
// PooledHandler - Constructor
// ============================================================================

impl PooledHandler {
    /// Creates a handler with its own identity.
    #[must_use]
    pub fn new(pool: Arc<Pool>, settings: HandlerSettings) -> Self {
        Self {
            pool,
            settings: Mutex::new(settings),
            identity: HandlerId::next(),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the handler identity.
    #[inline]
    #[must_use]
    pub fn identity(&self) -> HandlerId {
        self.identity
    }

    /// Snapshot of the current settings.
    #[must_use]
    pub fn settings(&self) -> HandlerSettings {
        self.settings.lock().clone()
    }
}

// ============================================================================
// PooledHandler - Settings
// ============================================================================

impl PooledHandler {
    /// Routes future sends through `proxy` (or directly, for `None`).
    pub fn set_proxy(&self, proxy: Option<ProxyConfig>) {
        self.settings.lock().proxy = proxy;
    }

    /// Changes TLS validation for future sends.
    pub fn set_validate_tls(&self, validate: bool) {
        self.settings.lock().validate_tls = validate;
    }

    /// Changes the per-request timeout for future sends.
    pub fn set_timeout(&self, timeout: Duration) {
        self.settings.lock().timeout = timeout;
    }
}

// ============================================================================
// PooledHandler - Lifecycle
// ============================================================================

impl PooledHandler {
    /// Creates a handler with the same settings but a fresh identity
    /// and a private connection, never the shared one.
    #[must_use]
    pub fn clone_handler(&self) -> Self {
        let settings = self.settings();
        let clone = Self::new(Arc::clone(&self.pool), settings.clone());
        self.pool.map_for(&settings).bind_exclusive(clone.identity);
        debug!(parent = %self.identity, clone = %clone.identity, "Cloned pooled handler");
        clone
    }

    /// Disposes this identity's current connection.
    ///
    /// Idempotent and terminal. Connections with outstanding rents
    /// survive until their guards return them; the mapping is dropped
    /// either way, and later sends from this handler fail with
    /// [`Error::ConnectionClosed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let settings = self.settings();
        self.pool
            .map_for(&settings)
            .dispose_connection(self.identity, true);
        debug!(identity = %self.identity, "Closed pooled handler");
    }
}

// ============================================================================
// HttpHandler Implementation
// ============================================================================

#[async_trait]
impl HttpHandler for PooledHandler {
    async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        // Closed is terminal: never resurrect a mapping for a disposed
        // identity.
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        let settings = self.settings();
        let rent = self.pool.map_for(&settings).rent(self.identity)?;
        // The guard returns the rent on drop, cancelled or not.
        rent.send(request, cancel).await
    }

    fn dispose(&self) {
        self.close();
    }
}

impl Drop for PooledHandler {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use futures_util::future::join_all;
    use http::StatusCode;
    use url::Url;

    use crate::error::Error;
    use crate::handler::HandlerFactory;
    use crate::pool::pool::PoolMode;
    use crate::pool::registry::RegistryConfig;
    use crate::socket::SocketProvider;

    struct YieldingHandler;

    #[async_trait]
    impl HttpHandler for YieldingHandler {
        async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
            tokio::select! {
                () = tokio::task::yield_now() => {
                    Ok(Response::new(request.url, StatusCode::OK))
                }
                () = cancel.cancelled() => Err(Error::Cancelled),
            }
        }
    }

    struct YieldingFactory;

    impl HandlerFactory for YieldingFactory {
        fn create(&self, _settings: &HandlerSettings) -> Result<Arc<dyn HttpHandler>> {
            Ok(Arc::new(YieldingHandler))
        }
    }

    fn pool(mode: PoolMode) -> Arc<Pool> {
        Pool::start(
            Arc::new(YieldingFactory),
            SocketProvider::new(4),
            RegistryConfig::default(),
            mode,
        )
    }

    fn request() -> Request {
        Request::get(Url::parse("http://example.com/").expect("valid url"))
    }

    #[tokio::test]
    async fn test_send_rents_and_returns() {
        let pool = pool(PoolMode::Shared);
        let handler = PooledHandler::new(Arc::clone(&pool), HandlerSettings::default());

        let response = handler
            .send(request(), &CancellationToken::new())
            .await
            .expect("send");
        assert!(response.is_success());

        assert_eq!(pool.registry().connection_count(), 1);
        pool.registry().shutdown();
        // Shutdown succeeds only if every rent was returned.
        assert_eq!(pool.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_sends_balance_rents() {
        let pool = pool(PoolMode::Shared);
        let handler = Arc::new(PooledHandler::new(
            Arc::clone(&pool),
            HandlerSettings::default(),
        ));

        // Half the sends get cancelled up front; rents must balance anyway.
        let mut tasks = Vec::new();
        for i in 0..32 {
            let handler = Arc::clone(&handler);
            tasks.push(async move {
                let cancel = CancellationToken::new();
                if i % 2 == 0 {
                    cancel.cancel();
                }
                handler.send(request(), &cancel).await
            });
        }
        let results = join_all(tasks).await;

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let cancelled = results
            .iter()
            .filter(|r| matches!(r, Err(Error::Cancelled)))
            .count();
        assert_eq!(ok, 16);
        assert_eq!(cancelled, 16);

        handler.close();
        pool.registry().sweep();
        assert_eq!(pool.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_settings_change_repartitions() {
        let pool = pool(PoolMode::Shared);
        let handler = PooledHandler::new(Arc::clone(&pool), HandlerSettings::default());

        handler
            .send(request(), &CancellationToken::new())
            .await
            .expect("send");
        assert_eq!(pool.partition_count(), 1);

        handler.set_proxy(Some(ProxyConfig::new("proxy", 8080)));
        handler
            .send(request(), &CancellationToken::new())
            .await
            .expect("send");
        assert_eq!(pool.partition_count(), 2);
        assert_eq!(pool.registry().connection_count(), 2);
    }

    #[tokio::test]
    async fn test_clone_handler_gets_private_connection() {
        let pool = pool(PoolMode::Shared);
        let original = PooledHandler::new(Arc::clone(&pool), HandlerSettings::default());
        let clone = original.clone_handler();
        assert_ne!(original.identity(), clone.identity());

        original
            .send(request(), &CancellationToken::new())
            .await
            .expect("send");
        clone
            .send(request(), &CancellationToken::new())
            .await
            .expect("send");

        // Shared mode, same settings, yet two connections: the clone is bound.
        assert_eq!(pool.registry().connection_count(), 2);
    }

    #[tokio::test]
    async fn test_close_drops_mapping() {
        let pool = pool(PoolMode::Exclusive);
        let handler = PooledHandler::new(Arc::clone(&pool), HandlerSettings::default());

        handler
            .send(request(), &CancellationToken::new())
            .await
            .expect("send");
        handler.close();
        pool.registry().sweep();
        assert_eq!(pool.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let pool = pool(PoolMode::Exclusive);
        let handler = PooledHandler::new(Arc::clone(&pool), HandlerSettings::default());

        handler
            .send(request(), &CancellationToken::new())
            .await
            .expect("send");
        handler.close();

        let err = handler
            .send(request(), &CancellationToken::new())
            .await
            .expect_err("closed handler");
        assert!(matches!(err, Error::ConnectionClosed));
        // The rejection must not have recreated a connection.
        assert_eq!(pool.registry().connection_count(), 0);
    }
}
