//! Handler factories.
//!
//! A factory constructs a fresh handler bound to a socket provider and a
//! settings value. The connection registry calls it whenever the pool
//! needs a new physical connection, so the factory is the seam where
//! alternative transports (or test stubs) plug in.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::error::Result;
use crate::handler::direct::DirectHandler;
use crate::handler::handler::HttpHandler;
use crate::handler::settings::HandlerSettings;
use crate::socket::SocketProvider;

// ============================================================================
// HandlerFactory
// ============================================================================

/// Constructs fresh handlers for the pool.
pub trait HandlerFactory: Send + Sync {
    /// Creates a handler configured with `settings`.
    ///
    /// Construction must be cheap; real transport work happens lazily on
    /// the first send.
    fn create(&self, settings: &HandlerSettings) -> Result<Arc<dyn HttpHandler>>;
}

// ============================================================================
// DirectHandlerFactory
// ============================================================================

/// Factory producing [`DirectHandler`]s over one shared socket provider.
pub struct DirectHandlerFactory {
    /// Socket source shared by every produced handler.
    provider: Arc<SocketProvider>,
}

impl DirectHandlerFactory {
    /// Creates a factory over the given provider.
    #[must_use]
    pub fn new(provider: Arc<SocketProvider>) -> Self {
        Self { provider }
    }

    /// Returns the shared socket provider.
    #[inline]
    #[must_use]
    pub fn provider(&self) -> &Arc<SocketProvider> {
        &self.provider
    }
}

impl HandlerFactory for DirectHandlerFactory {
    fn create(&self, settings: &HandlerSettings) -> Result<Arc<dyn HttpHandler>> {
        Ok(Arc::new(DirectHandler::new(
            Arc::clone(&self.provider),
            settings.clone(),
        )))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_creates_handlers() {
        let provider = SocketProvider::new(4);
        let factory = DirectHandlerFactory::new(provider);

        let settings = HandlerSettings::default();
        let first = factory.create(&settings).expect("create");
        let second = factory.create(&settings).expect("create");

        // Each call yields an independent handler instance.
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
