//! Exclusive and shared pool maps.
//!
//! A pool map decides which physical connection serves a given handler
//! identity. Maps hold only [`Weak`] references; the registry owns the
//! strong ones, so a connection the sweep disposed and purged simply
//! fails to upgrade here and is recreated on the next rent.
//!
//! Renting retries exactly once: a stale or disposed slot triggers one
//! fresh creation, and if even the fresh connection cannot be rented the
//! pool is considered exhausted.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::handler::HandlerSettings;
use crate::identifiers::HandlerId;
use crate::pool::connection::{PooledConnection, RentedConnection};
use crate::pool::registry::ConnectionRegistry;

// ============================================================================
// PoolMap
// ============================================================================

/// Maps handler identities to physical connections.
pub trait PoolMap: Send + Sync {
    /// Rents a connection for `identity`, creating one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] when a freshly created
    /// connection is disposed before it can be rented.
    fn rent(&self, identity: HandlerId) -> Result<RentedConnection>;

    /// Disposes the connection currently mapped to `identity`.
    ///
    /// `ignore_new` forces disposal of never-rented connections too.
    fn dispose_connection(&self, identity: HandlerId, ignore_new: bool);

    /// Gives `identity` a private connection from its next rent on.
    fn bind_exclusive(&self, identity: HandlerId);
}

// ============================================================================
// Slot Renting
// ============================================================================

/// Rents from a weak slot, recreating the connection at most once.
fn rent_from_slot(
    registry: &ConnectionRegistry,
    settings: &HandlerSettings,
    slot: &mut Weak<PooledConnection>,
    identity: HandlerId,
) -> Result<RentedConnection> {
    if let Some(connection) = slot.upgrade() {
        if let Some(rent) = connection.try_rent(identity) {
            return Ok(rent);
        }
        // Disposed between sweep and rent; fall through and recreate.
    }

    let connection = registry.create(settings)?;
    let rent = connection.try_rent(identity).ok_or_else(|| {
        Error::pool_exhausted("freshly created connection was disposed before first rent")
    })?;
    *slot = Arc::downgrade(&connection);
    debug!(identity = %identity, connection = %connection.id(), "Mapped fresh connection");
    Ok(rent)
}

/// Disposes whatever the slot points at, if anything.
fn dispose_slot(registry: &ConnectionRegistry, slot: &Weak<PooledConnection>, ignore_new: bool) {
    if let Some(connection) = slot.upgrade() {
        registry.try_dispose_item(&connection, ignore_new);
    }
}

// ============================================================================
// ExclusiveMap
// ============================================================================

/// One private connection per handler identity.
pub struct ExclusiveMap {
    registry: Arc<ConnectionRegistry>,
    settings: HandlerSettings,
    slots: Mutex<FxHashMap<HandlerId, Weak<PooledConnection>>>,
}

impl ExclusiveMap {
    /// Creates an exclusive map over the given registry partition.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, settings: HandlerSettings) -> Self {
        Self {
            registry,
            settings,
            slots: Mutex::new(FxHashMap::default()),
        }
    }
}

impl PoolMap for ExclusiveMap {
    fn rent(&self, identity: HandlerId) -> Result<RentedConnection> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(identity).or_insert_with(Weak::new);
        rent_from_slot(&self.registry, &self.settings, slot, identity)
    }

    fn dispose_connection(&self, identity: HandlerId, ignore_new: bool) {
        if let Some(slot) = self.slots.lock().remove(&identity) {
            dispose_slot(&self.registry, &slot, ignore_new);
        }
    }

    fn bind_exclusive(&self, _identity: HandlerId) {
        // Already exclusive.
    }
}

// ============================================================================
// SharedMap
// ============================================================================

/// One connection multiplexed across identities, with opt-out.
///
/// Every identity rents the single shared slot until it calls
/// [`bind_exclusive`](PoolMap::bind_exclusive), after which it gets a
/// private slot like in an [`ExclusiveMap`].
pub struct SharedMap {
    registry: Arc<ConnectionRegistry>,
    settings: HandlerSettings,

    /// The slot every unbound identity rents from.
    shared: Mutex<Weak<PooledConnection>>,

    /// Private slots for identities that opted out of sharing.
    bound: Mutex<FxHashMap<HandlerId, Weak<PooledConnection>>>,
}

impl SharedMap {
    /// Creates a shared map over the given registry partition.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, settings: HandlerSettings) -> Self {
        Self {
            registry,
            settings,
            shared: Mutex::new(Weak::new()),
            bound: Mutex::new(FxHashMap::default()),
        }
    }
}

impl PoolMap for SharedMap {
    fn rent(&self, identity: HandlerId) -> Result<RentedConnection> {
        {
            let mut bound = self.bound.lock();
            if let Some(slot) = bound.get_mut(&identity) {
                return rent_from_slot(&self.registry, &self.settings, slot, identity);
            }
        }

        let mut shared = self.shared.lock();
        rent_from_slot(&self.registry, &self.settings, &mut shared, identity)
    }

    fn dispose_connection(&self, identity: HandlerId, ignore_new: bool) {
        if let Some(slot) = self.bound.lock().remove(&identity) {
            dispose_slot(&self.registry, &slot, ignore_new);
            return;
        }
        dispose_slot(&self.registry, &self.shared.lock(), ignore_new);
    }

    fn bind_exclusive(&self, identity: HandlerId) {
        let mut bound = self.bound.lock();
        bound.entry(identity).or_insert_with(Weak::new);
        debug!(identity = %identity, "Bound identity to a private connection");
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
    use tokio_util::sync::CancellationToken;

    use crate::handler::{HandlerFactory, HttpHandler};
    use crate::message::{Request, Response};
    use crate::pool::registry::RegistryConfig;
    use crate::socket::SocketProvider;

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

    fn registry() -> Arc<ConnectionRegistry> {
        ConnectionRegistry::new(
            Arc::new(NoopFactory),
            SocketProvider::new(4),
            RegistryConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_exclusive_map_isolates_identities() {
        let registry = registry();
        let map = ExclusiveMap::new(Arc::clone(&registry), HandlerSettings::default());

        let alice = HandlerId::next();
        let bob = HandlerId::next();

        let rent_a = map.rent(alice).expect("rent");
        let rent_b = map.rent(bob).expect("rent");
        assert_ne!(rent_a.connection_id(), rent_b.connection_id());

        // Same identity keeps its connection across rents.
        let first = rent_a.connection_id();
        drop(rent_a);
        let again = map.rent(alice).expect("rent");
        assert_eq!(again.connection_id(), first);
    }

    #[tokio::test]
    async fn test_shared_map_multiplexes_identities() {
        let registry = registry();
        let map = SharedMap::new(Arc::clone(&registry), HandlerSettings::default());

        let rent_a = map.rent(HandlerId::next()).expect("rent");
        let rent_b = map.rent(HandlerId::next()).expect("rent");
        assert_eq!(rent_a.connection_id(), rent_b.connection_id());
        assert_eq!(registry.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_bind_exclusive_promotes_identity() {
        let registry = registry();
        let map = SharedMap::new(Arc::clone(&registry), HandlerSettings::default());

        let loner = HandlerId::next();
        let shared_rent = map.rent(HandlerId::next()).expect("rent");

        map.bind_exclusive(loner);
        let private_rent = map.rent(loner).expect("rent");
        assert_ne!(private_rent.connection_id(), shared_rent.connection_id());

        // Other identities keep multiplexing the shared slot.
        let other = map.rent(HandlerId::next()).expect("rent");
        assert_eq!(other.connection_id(), shared_rent.connection_id());
    }

    #[tokio::test]
    async fn test_disposed_slot_is_recreated() {
        let registry = registry();
        let map = SharedMap::new(Arc::clone(&registry), HandlerSettings::default());
        let identity = HandlerId::next();

        let first = map.rent(identity).expect("rent");
        let first_id = first.connection_id();
        drop(first);

        map.dispose_connection(identity, true);

        let second = map.rent(identity).expect("rent");
        assert_ne!(second.connection_id(), first_id);
    }

    #[tokio::test]
    async fn test_dispose_respects_outstanding_rent() {
        let registry = registry();
        let map = SharedMap::new(Arc::clone(&registry), HandlerSettings::default());

        let renter = HandlerId::next();
        let rent = map.rent(renter).expect("rent");
        let id = rent.connection_id();

        // Another identity closes while the first still holds a rent.
        map.dispose_connection(HandlerId::next(), true);

        let again = map.rent(HandlerId::next()).expect("rent");
        assert_eq!(again.connection_id(), id);
        drop(rent);
    }
}
