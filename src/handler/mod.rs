//! Handler abstraction and the direct TCP transport.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handler` | The [`HttpHandler`] trait all transports satisfy |
//! | `settings` | Pool partition key: proxy, TLS validation, timeout |
//! | `direct` | HTTP/1.1 over a single pooled TCP socket |
//! | `factory` | Handler construction seam used by the registry |
//! | `wire` | HTTP/1.1 serialization and response framing (internal) |

// ============================================================================
// Submodules
// ============================================================================

/// HTTP/1.1 over a single pooled TCP socket.
pub mod direct;

/// Handler construction seam used by the registry.
pub mod factory;

/// The handler trait.
pub mod handler;

/// Pool partition key.
pub mod settings;

/// HTTP/1.1 serialization and response framing.
pub(crate) mod wire;

// ============================================================================
// Re-exports
// ============================================================================

pub use direct::DirectHandler;
pub use factory::{DirectHandlerFactory, HandlerFactory};
pub use handler::HttpHandler;
pub use settings::{DEFAULT_TIMEOUT, HandlerSettings, ProxyConfig, ProxyCredentials};
