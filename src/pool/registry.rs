//! Connection registry and background eviction sweep.
//!
//! The registry owns every live pooled connection, regardless of which
//! pool map handed it out. A background task sweeps the live set on an
//! interval and disposes connections in three passes:
//!
//! 1. **Excess** - the live set grew past a multiple of the socket
//!    budget; trim oldest-first until back within bound.
//! 2. **Low headroom** - the socket provider is nearly out of permits;
//!    reclaim idle connections oldest-first until headroom returns.
//! 3. **Idle** - a connection has not been rented for the idle timeout;
//!    disposed even if it never served a request.
//!
//! The first two passes respect the new-connection grace period, the
//! idle pass does not. Connections with outstanding rents are never
//! disposed by any pass.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::handler::{HandlerFactory, HandlerSettings};
use crate::identifiers::ConnectionId;
use crate::pool::connection::PooledConnection;
use crate::socket::SocketProvider;

// ============================================================================
// Constants
// ============================================================================

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Default idle timeout before forced disposal.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(180);

/// Default live-set bound as a multiple of the socket budget.
pub const DEFAULT_EXCESS_FACTOR: u32 = 2;

/// Default fraction of the socket budget kept free.
pub const DEFAULT_HEADROOM_FRACTION: f64 = 0.2;

// ============================================================================
// RegistryConfig
// ============================================================================

/// Tuning knobs for the eviction sweep.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Interval between sweeps.
    pub sweep_interval: Duration,

    /// Idle time after which a connection is disposed regardless of age.
    pub idle_timeout: Duration,

    /// Live-set bound: `excess_factor * max_sockets`.
    pub excess_factor: u32,

    /// Headroom target: at least this fraction of permits free.
    pub headroom_fraction: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            excess_factor: DEFAULT_EXCESS_FACTOR,
            headroom_fraction: DEFAULT_HEADROOM_FRACTION,
        }
    }
}

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Owner of every live pooled connection.
pub struct ConnectionRegistry {
    /// Produces fresh handlers on demand.
    factory: Arc<dyn HandlerFactory>,

    /// Socket budget the headroom pass watches.
    provider: Arc<SocketProvider>,

    /// Sweep tuning.
    config: RegistryConfig,

    /// Every connection created and not yet purged.
    live: Mutex<FxHashMap<ConnectionId, Arc<PooledConnection>>>,

    /// Stops the sweep task.
    cancel: CancellationToken,
}

// ============================================================================
// ConnectionRegistry - Constructor
// ============================================================================

impl ConnectionRegistry {
    /// Creates a registry. The sweep task is not started; call
    /// [`spawn_sweeper`](Self::spawn_sweeper) once the registry is
    /// wrapped in its final `Arc`.
    #[must_use]
    pub fn new(
        factory: Arc<dyn HandlerFactory>,
        provider: Arc<SocketProvider>,
        config: RegistryConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            factory,
            provider,
            config,
            live: Mutex::new(FxHashMap::default()),
            cancel: CancellationToken::new(),
        })
    }

    /// Starts the background sweep task.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            registry.sweep_loop().await;
        });
    }
}

// ============================================================================
// ConnectionRegistry - Public API
// ============================================================================

impl ConnectionRegistry {
    /// Creates and tracks a new pooled connection.
    ///
    /// # Errors
    ///
    /// Propagates handler construction failures from the factory.
    pub fn create(&self, settings: &HandlerSettings) -> Result<Arc<PooledConnection>> {
        let handler = self.factory.create(settings)?;
        let connection = PooledConnection::new(handler);
        self.live
            .lock()
            .insert(connection.id(), Arc::clone(&connection));
        debug!(connection = %connection.id(), "Created pooled connection");
        Ok(connection)
    }

    /// Force-disposes one specific connection outside the sweep.
    ///
    /// Pool maps use this when a caller explicitly closes a handler.
    /// On success the live entry is purged immediately instead of on
    /// the next sweep. Returns whether the connection is now disposed.
    pub fn try_dispose_item(&self, connection: &PooledConnection, ignore_new: bool) -> bool {
        let disposed = connection.try_dispose(ignore_new);
        if disposed {
            self.live.lock().remove(&connection.id());
        }
        disposed
    }

    /// Number of live (not yet purged) connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Stops the sweep task and disposes every idle connection.
    ///
    /// Connections with outstanding rents survive; their rent guards
    /// keep them alive until returned.
    pub fn shutdown(&self) {
        self.cancel.cancel();

        let connections = self.drain_live();
        let mut survivors = 0usize;
        for connection in connections {
            if !connection.try_dispose(true) {
                survivors += 1;
            }
        }
        if survivors > 0 {
            warn!(survivors, "Registry shut down with rented connections");
        } else {
            info!("Registry shut down");
        }
    }
}

// ============================================================================
// ConnectionRegistry - Sweep
// ============================================================================

impl ConnectionRegistry {
    async fn sweep_loop(&self) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep(),
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    /// Runs one full sweep: all three passes, then purges disposed
    /// entries from the live set.
    pub fn sweep(&self) {
        let excess = self.evict_excess();
        let headroom = self.evict_low_headroom();
        let idle = self.evict_idle();
        let purged = self.purge_disposed();

        if excess + headroom + idle > 0 {
            debug!(
                excess,
                headroom,
                idle,
                purged,
                live = self.connection_count(),
                "Sweep evicted connections"
            );
        }
    }

    /// Pass 1: the live set outgrew the socket budget.
    pub fn evict_excess(&self) -> usize {
        let bound = self.provider.max_sockets() * self.config.excess_factor as usize;
        let count = self.connection_count();
        if count <= bound {
            return 0;
        }

        let mut evicted = 0;
        for connection in self.idle_oldest_first() {
            if self.connection_count() - evicted <= bound {
                break;
            }
            if connection.try_dispose(false) {
                evicted += 1;
            }
        }
        evicted
    }

    /// Pass 2: the socket provider is nearly out of permits.
    pub fn evict_low_headroom(&self) -> usize {
        let target =
            (self.provider.max_sockets() as f64 * self.config.headroom_fraction).ceil() as usize;
        if self.provider.available_sockets() >= target {
            return 0;
        }

        let mut evicted = 0;
        for connection in self.idle_oldest_first() {
            // Disposing releases the connection's socket permit, so the
            // headroom reading moves as we go.
            if self.provider.available_sockets() >= target {
                break;
            }
            if connection.try_dispose(false) {
                evicted += 1;
            }
        }
        evicted
    }

    /// Pass 3: connections idle past the timeout, grace period ignored.
    pub fn evict_idle(&self) -> usize {
        let timeout = self.config.idle_timeout;
        let mut evicted = 0;
        for connection in self.snapshot() {
            if connection.is_disposed() || connection.rent_count() > 0 {
                continue;
            }
            if connection.last_rent().elapsed() >= timeout && connection.try_dispose(true) {
                evicted += 1;
            }
        }
        evicted
    }

    /// Drops disposed entries from the live map.
    fn purge_disposed(&self) -> usize {
        let mut live = self.live.lock();
        let before = live.len();
        live.retain(|_, connection| !connection.is_disposed());
        before - live.len()
    }

    /// Idle, not-yet-disposed connections, oldest last-rent first.
    fn idle_oldest_first(&self) -> Vec<Arc<PooledConnection>> {
        let mut candidates: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|c| !c.is_disposed() && c.rent_count() == 0)
            .collect();
        candidates.sort_by_key(|c| c.last_rent());
        candidates
    }

    fn snapshot(&self) -> Vec<Arc<PooledConnection>> {
        self.live.lock().values().cloned().collect()
    }

    fn drain_live(&self) -> Vec<Arc<PooledConnection>> {
        self.live.lock().drain().map(|(_, c)| c).collect()
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Tests
// ============================================================================
