//! Session core shared by the gymapp and admin clients.
//!
//! The identity SDK reports its state into [`SessionContext`], which runs the
//! reconciliation state machine, persists the internal session through a
//! [`SessionStore`] and publishes the result to every consumer.

mod cell;
pub mod context;
pub mod exchange;
pub mod identity;
pub mod navigation;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod user;

pub use context::{SessionContext, SessionDeps, SessionError};
pub use exchange::{ExchangeError, VerifiedSession, VerifyTransport};
pub use identity::{
    IdentityError, IdentityFingerprint, IdentityProfile, IdentityProvider, IdentitySnapshot,
};
pub use navigation::{
    ClearStoreAndRedirect, DEFAULT_ENTRY_ROUTE, LoggingNavigator, Navigator, UnauthorizedHandler,
};
pub use reconcile::{ReconcileError, ReconcileOutcome, Transition};
pub use session::{PersistedSession, Session, SessionPhase};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoreError};
pub use user::{SessionUser, UserRole};
