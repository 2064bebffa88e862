//! The settings-partitioned connection pool.
//!
//! The pool keeps one [`PoolMap`] per distinct [`HandlerSettings`]
//! value. Handlers with the same proxy/TLS/timeout configuration land in
//! the same map and may share connections; handlers that differ in any
//! field never do. Maps are created lazily on first rent and all feed
//! the one [`ConnectionRegistry`], whose sweep enforces the global
//! socket budget across every partition.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::handler::{HandlerFactory, HandlerSettings};
use crate::pool::map::{ExclusiveMap, PoolMap, SharedMap};
use crate::pool::registry::{ConnectionRegistry, RegistryConfig};
use crate::socket::SocketProvider;

// ============================================================================
// PoolMode
// ============================================================================

/// Connection sharing policy applied to every partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    /// Each handler identity gets a private connection.
    Exclusive,
    /// Identities with equal settings multiplex one connection.
    Shared,
}

// ============================================================================
// Pool
// ============================================================================

/// Lazily partitioned pool over one connection registry.
pub struct Pool {
    registry: Arc<ConnectionRegistry>,
    maps: Mutex<FxHashMap<HandlerSettings, Arc<dyn PoolMap>>>,
    mode: PoolMode,
}

impl Pool {
    /// Creates a pool and starts the registry's eviction sweep.
    #[must_use]
    pub fn start(
        factory: Arc<dyn HandlerFactory>,
        provider: Arc<SocketProvider>,
        config: RegistryConfig,
        mode: PoolMode,
    ) -> Arc<Self> {
        let registry = ConnectionRegistry::new(factory, provider, config);
        registry.spawn_sweeper();
        Arc::new(Self {
            registry,
            maps: Mutex::new(FxHashMap::default()),
            mode,
        })
    }

    /// Returns the map for `settings`, creating it on first use.
    #[must_use]
    pub fn map_for(&self, settings: &HandlerSettings) -> Arc<dyn PoolMap> {
        let mut maps = self.maps.lock();
        if let Some(map) = maps.get(settings) {
            return Arc::clone(map);
        }

        let map: Arc<dyn PoolMap> = match self.mode {
            PoolMode::Exclusive => Arc::new(ExclusiveMap::new(
                Arc::clone(&self.registry),
                settings.clone(),
            )),
            PoolMode::Shared => Arc::new(SharedMap::new(
                Arc::clone(&self.registry),
                settings.clone(),
            )),
        };
        maps.insert(settings.clone(), Arc::clone(&map));
        debug!(partitions = maps.len(), "Created pool partition");
        map
    }

    /// The registry backing every partition.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Number of partitions created so far.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.maps.lock().len()
    }

    /// Stops the sweep and disposes every idle connection.
    pub fn shutdown(&self) {
        self.registry.shutdown();
        self.maps.lock().clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
