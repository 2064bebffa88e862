//! Callback registrations and receivers.
//!
//! A [`CallbackRegistration`] is a UUID-rooted namespace on the server
//! (`/cb/{uuid}`). Receivers hang sub-paths off it and await inbound
//! requests one at a time. Dropping a receiver unregisters its path.
//! Receivers share ownership of their namespace, so the idiomatic
//! one-liner `server.register().receiver("x")` keeps the route alive
//! for as long as the receiver lives; the namespace itself is
//! unregistered once the registration and all its receivers are gone.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::callback::server::CallbackServer;
use crate::error::{Error, Result};
use crate::message::Request;

// ============================================================================
// CallbackRegistration
// ============================================================================

/// Namespace state shared between a registration and its receivers.
///
/// The namespace routes are only torn down once the last owner drops,
/// so a receiver outliving its registration keeps its route working.
struct Namespace {
    server: Arc<CallbackServer>,
    base_path: String,
}

impl Drop for Namespace {
    fn drop(&mut self) {
        self.server.remove_routes_with_prefix(&self.base_path);
    }
}

/// A `/cb/{uuid}` namespace on a callback server.
pub struct CallbackRegistration {
    namespace: Arc<Namespace>,
}

impl CallbackRegistration {
    pub(crate) fn new(server: Arc<CallbackServer>, base_path: String) -> Self {
        Self {
            namespace: Arc::new(Namespace { server, base_path }),
        }
    }

    /// The namespace root path.
    #[inline]
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.namespace.base_path
    }

    /// The externally reachable URL of the namespace root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Callback`] when the path does not join onto the
    /// server's external URL.
    pub fn url(&self) -> Result<Url> {
        join_external(
            self.namespace.server.external_url(),
            &self.namespace.base_path,
        )
    }

    /// Creates a receiver at `{base}/{sub_path}` (or the root for an
    /// empty sub-path). A later receiver on the same path replaces the
    /// earlier one's route.
    #[must_use]
    pub fn receiver(&self, sub_path: &str) -> CallbackReceiver {
        let sub_path = sub_path.trim_matches('/');
        let path = if sub_path.is_empty() {
            self.namespace.base_path.clone()
        } else {
            format!("{}/{sub_path}", self.namespace.base_path)
        };

        let (tx, rx) = mpsc::unbounded_channel();
        self.namespace.server.insert_route(path.clone(), tx);
        debug!(path = %path, "Registered callback receiver");
        CallbackReceiver {
            namespace: Arc::clone(&self.namespace),
            path,
            rx: tokio::sync::Mutex::new(rx),
        }
    }
}

// ============================================================================
// CallbackReceiver
// ============================================================================

/// Receives inbound requests routed to one path.
pub struct CallbackReceiver {
    namespace: Arc<Namespace>,
    path: String,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Request>>,
}

impl CallbackReceiver {
    /// The routed path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The externally reachable URL of this receiver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Callback`] when the path does not join onto the
    /// server's external URL.
    pub fn url(&self) -> Result<Url> {
        join_external(self.namespace.server.external_url(), &self.path)
    }

    /// Waits for the next inbound request.
    ///
    /// # Errors
    ///
    /// - [`Error::ReceiveTimeout`] when nothing arrives within `wait`
    /// - [`Error::Cancelled`] when the caller's token fires
    /// - [`Error::Callback`] when the route was dropped server-side
    pub async fn receive(&self, wait: Duration, cancel: &CancellationToken) -> Result<Request> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            delivered = rx.recv() => {
                delivered.ok_or_else(|| Error::callback("callback route closed"))
            }
            () = tokio::time::sleep(wait) => {
                Err(Error::receive_timeout(wait.as_millis() as u64))
            }
            () = cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

impl Drop for CallbackReceiver {
    fn drop(&mut self) {
        self.namespace.server.remove_route(&self.path);
    }
}

fn join_external(external: &Url, path: &str) -> Result<Url> {
    external
        .join(path)
        .map_err(|e| Error::callback(format!("unusable callback path {path:?}: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
