use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::cell::SessionCell;
use crate::exchange::VerifyTransport;
use crate::identity::{IdentityError, IdentityProvider, IdentitySnapshot};
use crate::navigation::{Navigator, UnauthorizedHandler};
use crate::reconcile::{DEFAULT_EXCHANGE_TIMEOUT_MS, ReconcileOutcome, Reconciler};
use crate::session::Session;
use crate::store::{SessionStore, StoreError};
use crate::user::SessionUser;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

pub struct SessionDeps {
    pub store: Arc<dyn SessionStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub transport: Arc<dyn VerifyTransport>,
    pub navigator: Arc<dyn Navigator>,
    pub exchange_timeout: Duration,
}

impl SessionDeps {
    pub fn new(
        store: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityProvider>,
        transport: Arc<dyn VerifyTransport>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            store,
            identity,
            transport,
            navigator,
            exchange_timeout: Duration::from_millis(DEFAULT_EXCHANGE_TIMEOUT_MS),
        }
    }

    #[must_use]
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }
}

/// Owner of the reconciled session and the only entry point for changing it.
///
/// Consumers read `session()` or `subscribe()`; `is_authenticated` is always
/// derived from the current token/user pair.
pub struct SessionContext {
    cell: Arc<SessionCell>,
    reconciler: Arc<Reconciler>,
    store: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
}

impl SessionContext {
    /// Build the context, hydrating synchronously from the store. The session
    /// stays loading until the first identity report is reconciled.
    pub fn new(deps: SessionDeps) -> Self {
        let stored = deps.store.read();
        let reconciler = Arc::new(Reconciler::new(
            deps.store.clone(),
            deps.identity.clone(),
            deps.transport,
            deps.exchange_timeout,
        ));
        Self {
            cell: Arc::new(SessionCell::new(Session::hydrated(&stored))),
            reconciler,
            store: deps.store,
            identity: deps.identity,
            navigator: deps.navigator,
        }
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.cell.current().0
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.cell.subscribe()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session().is_authenticated()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.session().is_loading()
    }

    /// Wait for the first settled session; hosts gate rendering on this.
    pub async fn ready(&self) -> Session {
        let mut rx = self.cell.subscribe();
        match rx.wait_for(|session| !session.is_loading()).await {
            Ok(session) => session.clone(),
            Err(_) => self.session(),
        }
    }

    /// Feed one identity SDK report through the state machine. A token
    /// exchange started here keeps running if this future is dropped.
    pub async fn identity_changed(&self, snapshot: &IdentitySnapshot) -> ReconcileOutcome {
        self.reconciler.reconcile(&self.cell, snapshot).await
    }

    /// Reconcile against whatever the provider reports right now.
    pub async fn sync_identity(&self) -> ReconcileOutcome {
        let snapshot = self.identity.snapshot();
        self.identity_changed(&snapshot).await
    }

    pub async fn login(&self) -> Result<(), SessionError> {
        self.identity.login().await?;
        Ok(())
    }

    /// Clear the local session, then end the provider session.
    ///
    /// The local clear always happens; a provider failure is reported after
    /// the user has been sent to the entry route instead.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.clear_local();
        tracing::info!("signed out");
        if let Err(error) = self.identity.logout().await {
            tracing::warn!(error = %error, "identity provider logout failed");
            self.navigator.redirect_to_entry();
            return Err(error.into());
        }
        Ok(())
    }

    /// Install a token/user pair obtained outside reconciliation, such as a
    /// token re-issued after role selection. If the store rejects the pair,
    /// both the store and memory end up signed out.
    pub fn set_auth_data(
        &self,
        token: impl Into<String>,
        user: SessionUser,
    ) -> Result<(), SessionError> {
        let token = token.into();
        let result = self.cell.update(|state| -> Result<(), SessionError> {
            state.generation += 1;
            if let Err(error) = self.store.write(&token, &user) {
                tracing::warn!(error = %error, "failed to persist session; signing out locally");
                self.store.clear();
                state.session = Session::signed_out();
                return Err(error.into());
            }
            tracing::info!(user_id = %user.id, "session replaced");
            state.session = Session::established(token, user);
            Ok(())
        });
        if result.is_err() {
            self.reconciler.reset();
        }
        result
    }

    fn clear_local(&self) {
        self.cell.update(|state| {
            self.store.clear();
            state.session = Session::signed_out();
            state.generation += 1;
        });
        self.reconciler.reset();
    }
}

impl UnauthorizedHandler for SessionContext {
    fn force_logout(&self) {
        tracing::warn!("backend rejected session token; signing out locally");
        self.clear_local();
        self.navigator.redirect_to_entry();
    }
}
