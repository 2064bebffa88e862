//! Socket provider with admission control and byte instrumentation.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `provider` | Admission-limited TCP socket creation |
//! | `stream` | Permit-holding socket with optional byte counters |

// ============================================================================
// Submodules
// ============================================================================

/// Admission-limited TCP socket creation.
pub mod provider;

/// Permit-holding socket with optional byte counters.
pub mod stream;

// ============================================================================
// Re-exports
// ============================================================================

pub use provider::{DEFAULT_MAX_SOCKETS, SocketProvider};
pub use stream::{ByteCounters, PooledSocket};
