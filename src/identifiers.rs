//! Type-safe identifiers for transport entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time:
//!
//! - [`HandlerId`] - One logical caller identity (one per pooled handler
//!   instance; a clone gets a fresh identity)
//! - [`ConnectionId`] - One pooled connection in a registry's live set
//!
//! Both are process-local monotonic counters. They are never reused within
//! a process lifetime, so a stale map entry can never alias a newer entity.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// HandlerId
// ============================================================================

/// Identity of one logical request issuer.
///
/// Pool maps key their entries by `HandlerId`: an exclusive map gives each
/// identity a private connection, a shared map multiplexes identities onto
/// a common one unless an identity is explicitly bound exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Returns the next unique handler identity.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Identity of one pooled connection.
///
/// Used as the key of the registry's live set and in log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Returns the next unique connection identity.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_ids_unique() {
        let a = HandlerId::next();
        let b = HandlerId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_connection_ids_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_format() {
        let id = HandlerId::next();
        assert!(id.to_string().starts_with("handler-"));

        let id = ConnectionId::next();
        assert!(id.to_string().starts_with("conn-"));
    }
}
