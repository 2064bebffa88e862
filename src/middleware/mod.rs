//! Composable handler decorators.
//!
//! Every middleware wraps an inner [`HttpHandler`] and is itself one,
//! so decorators stack in any order. The builder assembles the default
//! chain outermost to innermost as:
//!
//! ```text
//! Limit → Retry → Redirect → Cookies → Compression → Stats → Pooled
//! ```
//!
//! Stats sits innermost so each physical attempt (every retry, every
//! redirect hop) is counted once.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `limit` | In-flight request cap with FIFO queueing |
//! | `retry` | Fixed-delay retry of transient failures |
//! | `redirect` | 301/302/307/308 following with a hop limit |
//! | `cookies` | Shared cookie jar injection and collection |
//! | `compression` | gzip/deflate response inflation |
//! | `stats` | Per-attempt counters and failure histogram |
//!
//! [`HttpHandler`]: crate::handler::HttpHandler

// ============================================================================
// Submodules
// ============================================================================

/// gzip/deflate response inflation.
pub mod compression;

/// Shared cookie jar injection and collection.
pub mod cookies;

/// In-flight request cap.
pub mod limit;

/// Redirect following.
pub mod redirect;

/// Fixed-delay retry of transient failures.
pub mod retry;

/// Per-attempt counters.
pub mod stats;

// ============================================================================
// Re-exports
// ============================================================================

pub use compression::CompressionHandler;
pub use cookies::{Cookie, CookieHandler, CookieJar};
pub use limit::LimitHandler;
pub use redirect::{MAX_REDIRECT_HOPS, RedirectHandler};
pub use retry::{DEFAULT_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryHandler};
pub use stats::{StatsHandler, StatsSnapshot, TransportStats};
