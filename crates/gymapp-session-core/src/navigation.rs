use std::sync::Arc;

use crate::store::SessionStore;

pub const DEFAULT_ENTRY_ROUTE: &str = "/";

/// Moves the user back to the application's entry route.
pub trait Navigator: Send + Sync {
    fn redirect_to_entry(&self);
}

/// Invoked by the request pipeline whenever the backend answers 401.
///
/// Implementations must finish clearing local session state before they
/// navigate, so nothing dispatched afterwards can carry the old token.
pub trait UnauthorizedHandler: Send + Sync {
    fn force_logout(&self);
}

/// Store-only forced logout for callers that run the pipeline without a
/// `SessionContext`.
pub struct ClearStoreAndRedirect {
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
}

impl ClearStoreAndRedirect {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self { store, navigator }
    }
}

impl UnauthorizedHandler for ClearStoreAndRedirect {
    fn force_logout(&self) {
        tracing::warn!("backend rejected session token; clearing persisted session");
        self.store.clear();
        self.navigator.redirect_to_entry();
    }
}

/// Navigator that only logs the route change, for headless hosts.
#[derive(Debug, Clone)]
pub struct LoggingNavigator {
    entry_route: String,
}

impl LoggingNavigator {
    #[must_use]
    pub fn new(entry_route: impl Into<String>) -> Self {
        Self {
            entry_route: entry_route.into(),
        }
    }
}

impl Default for LoggingNavigator {
    fn default() -> Self {
        Self::new(DEFAULT_ENTRY_ROUTE)
    }
}

impl Navigator for LoggingNavigator {
    fn redirect_to_entry(&self) {
        tracing::info!(route = %self.entry_route, "returning to entry route");
    }
}
