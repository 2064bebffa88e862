//! Out-of-band HTTP callback receiving.
//!
//! Some services answer a request out of band: the response to the
//! original call only acknowledges it, and the real result arrives
//! later as an HTTP request to a URL the caller advertised. This module
//! provides that URL: a loopback-self-tested listener, UUID-rooted
//! registrations, and awaitable receivers.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `server` | Fail-closed listener with longest-prefix routing |
//! | `receiver` | Registrations and awaitable receivers |

// ============================================================================
// Submodules
// ============================================================================

/// Registrations and awaitable receivers.
pub mod receiver;

/// Fail-closed listener with longest-prefix routing.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use receiver::{CallbackReceiver, CallbackRegistration};
pub use server::{CallbackServer, CallbackServerConfig, DEFAULT_SELF_TEST_TIMEOUT};
