//! Uniform HTTP request/response abstraction.
//!
//! Every handler in the crate - direct, pooled, or middleware - consumes
//! a [`Request`] and produces a [`Response`]. Wire framing lives in the
//! transport layer; these types only describe content.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `body` | Re-openable byte content provider |
//! | `request` | Request: method, URL, headers, body, version hint |
//! | `response` | Response: status, reason, headers, body |

// ============================================================================
// Submodules
// ============================================================================

/// Re-openable byte content provider.
pub mod body;

/// HTTP request type.
pub mod request;

/// HTTP response type.
pub mod response;

// ============================================================================
// Re-exports
// ============================================================================

pub use body::Body;
pub use request::Request;
pub use response::Response;
