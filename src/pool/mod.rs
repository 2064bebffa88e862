//! Connection pooling engine.
//!
//! ```text
//!  PooledHandler ──rent──▶ Pool ──partition──▶ PoolMap (exclusive|shared)
//!                                                 │ weak
//!                                                 ▼
//!                          ConnectionRegistry ◀─owns── PooledConnection
//!                                 │ sweep                    │
//!                                 ▼                          ▼
//!                          eviction passes            DirectHandler
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Rent-counted connection wrapper and RAII rent guard |
//! | `registry` | Connection ownership and the background eviction sweep |
//! | `map` | Exclusive and shared identity-to-connection maps |
//! | `pool` | Settings-partitioned map of maps |
//! | `handler` | The pooled handler identities rent through |

// ============================================================================
// Submodules
// ============================================================================

/// Rent-counted connection wrapper and RAII rent guard.
pub mod connection;

/// The pooled handler.
pub mod handler;

/// Exclusive and shared identity-to-connection maps.
pub mod map;

/// Settings-partitioned map of maps.
pub mod pool;

/// Connection ownership and the background eviction sweep.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{PooledConnection, RentedConnection};
pub use handler::PooledHandler;
pub use map::{ExclusiveMap, PoolMap, SharedMap};
pub use pool::{Pool, PoolMode};
pub use registry::{ConnectionRegistry, RegistryConfig};
