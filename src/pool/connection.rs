//! Pooled connection wrapper and the rent guard.
//!
//! A [`PooledConnection`] wraps one physical handler with rent accounting
//! and a dispose gate. Renting takes the gate in read mode so any number
//! of callers can rent concurrently; disposal takes it in write mode so a
//! connection can never be torn down while a rent is being granted.
//!
//! Callers never hold a raw connection. They hold a [`RentedConnection`],
//! an RAII guard whose `Drop` returns the rent. Returning on drop rather
//! than on an explicit call keeps the accounting balanced even when the
//! caller's future is cancelled mid-send.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::handler::HttpHandler;
use crate::message::{Request, Response};
use crate::identifiers::{ConnectionId, HandlerId};

// ============================================================================
// PooledConnection
// ============================================================================

/// One physical connection with rent accounting and a dispose gate.
pub struct PooledConnection {
    /// Connection identity, for logs and diagnostics.
    id: ConnectionId,

    /// The wrapped transport.
    handler: Arc<dyn HttpHandler>,

    /// Number of rents currently outstanding.
    rent_count: AtomicU32,

    /// True until the first rent. New connections get a grace period
    /// before non-forced eviction may claim them.
    is_new: AtomicBool,

    /// Set exactly once, under the write gate.
    disposed: AtomicBool,

    /// Instant of the most recent rent (creation time before any rent).
    last_rent: Mutex<Instant>,

    /// Rent/dispose exclusion: rents hold read, disposal holds write.
    gate: RwLock<()>,

    /// Outstanding rents per renting handler identity.
    rents_by_identity: Mutex<FxHashMap<HandlerId, u32>>,
}

impl PooledConnection {
    /// Wraps a freshly created handler.
    #[must_use]
    pub fn new(handler: Arc<dyn HttpHandler>) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
            handler,
            rent_count: AtomicU32::new(0),
            is_new: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            last_rent: Mutex::new(Instant::now()),
            gate: RwLock::new(()),
            rents_by_identity: Mutex::new(FxHashMap::default()),
        })
    }

    /// Returns the connection identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Number of rents currently outstanding.
    #[inline]
    #[must_use]
    pub fn rent_count(&self) -> u32 {
        self.rent_count.load(Ordering::Acquire)
    }

    /// Whether the connection has never been rented.
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new.load(Ordering::Acquire)
    }

    /// Whether the connection has been disposed.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Instant of the most recent rent.
    #[must_use]
    pub fn last_rent(&self) -> Instant {
        *self.last_rent.lock()
    }

    /// Attempts to rent this connection for `identity`.
    ///
    /// Returns a guard on success, or `None` when the connection has
    /// already been disposed and the caller must obtain a fresh one.
    #[must_use]
    pub fn try_rent(self: &Arc<Self>, identity: HandlerId) -> Option<RentedConnection> {
        // Read mode: concurrent rents are fine, disposal is excluded.
        let _gate = self.gate.read();
        if self.disposed.load(Ordering::Acquire) {
            return None;
        }

        self.rent_count.fetch_add(1, Ordering::AcqRel);
        self.is_new.store(false, Ordering::Release);
        *self.last_rent.lock() = Instant::now();
        *self.rents_by_identity.lock().entry(identity).or_insert(0) += 1;

        Some(RentedConnection {
            connection: Arc::clone(self),
            identity,
        })
    }

    /// Returns one rent taken by `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RentImbalance`] when the count would underflow,
    /// which indicates a double return.
    fn release(&self, identity: HandlerId) -> Result<()> {
        {
            let mut by_identity = self.rents_by_identity.lock();
            match by_identity.get_mut(&identity) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    by_identity.remove(&identity);
                }
                None => return Err(Error::rent_imbalance(self.id)),
            }
        }

        let previous = self.rent_count.fetch_sub(1, Ordering::AcqRel);
        if previous == 0 {
            // Undo the wrap; the per-identity map already caught most of
            // these, but a torn state must not go negative.
            self.rent_count.fetch_add(1, Ordering::AcqRel);
            return Err(Error::rent_imbalance(self.id));
        }
        Ok(())
    }

    /// Attempts to dispose the connection.
    ///
    /// Returns `true` when the connection is disposed after the call
    /// (including when it already was). Returns `false` when rents are
    /// outstanding, or when the connection is new and `ignore_new` is
    /// not set.
    pub fn try_dispose(&self, ignore_new: bool) -> bool {
        // Write mode: no rent can be granted while we decide.
        let _gate = self.gate.write();
        if self.disposed.load(Ordering::Acquire) {
            return true;
        }
        if self.rent_count.load(Ordering::Acquire) > 0 {
            return false;
        }
        if !ignore_new && self.is_new.load(Ordering::Acquire) {
            return false;
        }

        self.handler.dispose();
        self.disposed.store(true, Ordering::Release);
        debug!(connection = %self.id, "Disposed pooled connection");
        true
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("rent_count", &self.rent_count())
            .field("is_new", &self.is_new())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ============================================================================
// RentedConnection
// ============================================================================

/// RAII rent guard. Dropping it returns the rent.
pub struct RentedConnection {
    connection: Arc<PooledConnection>,
    identity: HandlerId,
}

impl RentedConnection {
    /// Identity of the connection backing this rent.
    #[inline]
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// Sends a request over the rented connection.
    pub async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        self.connection.handler.send(request, cancel).await
    }
}

impl Drop for RentedConnection {
    fn drop(&mut self) {
        if let Err(err) = self.connection.release(self.identity) {
            // Accounting bugs must be loud. They cannot be returned from
            // a destructor, so log and assert in debug builds.
            error!(
                connection = %self.connection.id(),
                identity = %self.identity,
                error = %err,
                "Rent return failed"
            );
            debug_assert!(false, "rent return failed: {err}");
        }
    }
}

impl std::fmt::Debug for RentedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RentedConnection")
            .field("connection", &self.connection.id())
            .field("identity", &self.identity)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
