//! Pooled HTTP - pluggable HTTP transport with connection pooling.
//!
//! This library provides an HTTP/1.1 client transport built around a
//! connection-pooling engine and a stack of composable middleware.
//!
//! # Architecture
//!
//! Everything that can send a request implements one trait,
//! [`HttpHandler`]. The direct TCP transport implements it, the pooled
//! handler implements it, and every middleware decorator wraps another
//! implementation of it:
//!
//! - **Pool**: connections are partitioned by [`HandlerSettings`]
//!   (proxy, TLS validation, timeout); equal settings may share, unequal
//!   settings never do
//! - **Renting**: callers hold RAII rent guards; returns happen on drop,
//!   so cancellation can never leak a rent
//! - **Eviction**: a background sweep disposes excess, socket-starved,
//!   and idle connections
//! - **Callbacks**: an out-of-band HTTP listener routes inbound
//!   callback requests to awaitable in-process receivers
//!
//! # Quick Start
//!
//! ```no_run
//! use pooled_http::{Request, Result, TransportBuilder};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = TransportBuilder::new()
//!         .max_sockets(32)
//!         .build()?;
//!
//!     let url = Url::parse("http://example.com/").expect("valid url");
//!     let response = transport
//!         .send(Request::get(url), &CancellationToken::new())
//!         .await?
//!         .ensure_success()?;
//!     println!("{}", response.body.text());
//!
//!     transport.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`message`] | Request, response, and body types |
//! | [`handler`] | [`HttpHandler`] trait and the direct TCP transport |
//! | [`socket`] | Admission-controlled socket provider |
//! | [`pool`] | Pooling engine: connections, registry, maps, sweep |
//! | [`middleware`] | Retry, redirect, cookies, compression, stats, limit |
//! | [`builder`] | Transport assembly |
//! | [`callback`] | Out-of-band HTTP callback receiving |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |

// ============================================================================
// Modules
// ============================================================================

/// Transport assembly.
///
/// Use [`TransportBuilder::new()`] to configure and build a transport.
pub mod builder;

/// Out-of-band HTTP callback receiving.
pub mod callback;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// The handler trait and the direct TCP transport.
pub mod handler;

/// Type-safe identifiers for handlers and connections.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Request, response, and body types.
pub mod message;

/// Composable handler decorators.
pub mod middleware;

/// Connection pooling engine.
pub mod pool;

/// Admission-controlled socket provider.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

// Content types
pub use message::{Body, Request, Response};

// Handler types
pub use handler::{
    DirectHandler, DirectHandlerFactory, HandlerFactory, HandlerSettings, HttpHandler,
    ProxyConfig, ProxyCredentials,
};

// Socket types
pub use socket::{ByteCounters, PooledSocket, SocketProvider};

// Pool types
pub use pool::{Pool, PoolMode, PooledHandler, RegistryConfig, RentedConnection};

// Middleware types
pub use middleware::{Cookie, CookieJar, StatsSnapshot, TransportStats};

// Assembly
pub use builder::{Transport, TransportBuilder};

// Callback types
pub use callback::{CallbackReceiver, CallbackRegistration, CallbackServer, CallbackServerConfig};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, HandlerId};
