use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::cell::SessionCell;
use crate::exchange::{ExchangeError, VerifiedSession, VerifyTransport};
use crate::identity::{IdentityError, IdentityFingerprint, IdentityProvider, IdentitySnapshot};
use crate::session::{PersistedSession, Session, SessionPhase};
use crate::store::{SessionStore, StoreError};

pub const DEFAULT_EXCHANGE_TIMEOUT_MS: u64 = 15_000;

/// What one identity report should do to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Identity SDK is still starting; stay loading.
    Wait,
    /// Stored token and user win; no network.
    Restore,
    Exchange,
    SignOut,
    /// Nothing to do in the current phase.
    Keep,
}

/// Decide the transition for `snapshot`. Pure so precedence stays testable:
/// a complete stored session beats whatever the SDK reports.
#[must_use]
pub fn plan(
    phase: SessionPhase,
    snapshot: &IdentitySnapshot,
    stored: &PersistedSession,
) -> Transition {
    match phase {
        SessionPhase::Established | SessionPhase::Reconciling => return Transition::Keep,
        SessionPhase::Uninitialized | SessionPhase::NoSession => {}
    }
    if snapshot.is_loading {
        return if phase == SessionPhase::Uninitialized {
            Transition::Wait
        } else {
            Transition::Keep
        };
    }
    if stored.complete().is_some() {
        return Transition::Restore;
    }
    if snapshot.is_authenticated {
        return Transition::Exchange;
    }
    if phase == SessionPhase::NoSession && stored.is_empty() {
        return Transition::Keep;
    }
    Transition::SignOut
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("exchange_timed_out_after_{0}ms")]
    Timeout(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Waiting,
    Restored,
    Exchanged,
    /// Exchange failed; the session is now signed out.
    ExchangeFailed(ReconcileError),
    SignedOut,
    /// Another exchange is already in flight.
    Suppressed,
    Unchanged,
    /// The exchange finished after something else settled the session.
    Discarded,
}

#[derive(Debug, Default)]
struct Guard {
    in_flight: Option<IdentityFingerprint>,
    last_seen: Option<IdentityFingerprint>,
}

/// Frees the in-flight slot when the exchange task ends, however it ends. A
/// session still `Reconciling` under the same generation is settled to
/// `NoSession` so it can never stay loading.
struct InFlight<'a> {
    guard: &'a Mutex<Guard>,
    cell: &'a SessionCell,
    generation: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock_guard(self.guard).in_flight = None;
        let generation = self.generation;
        self.cell.update(|state| {
            if state.generation == generation
                && state.session.phase() == SessionPhase::Reconciling
            {
                tracing::warn!("token exchange ended without a result; signing out locally");
                state.session = Session::signed_out();
            }
        });
    }
}

fn lock_guard(guard: &Mutex<Guard>) -> MutexGuard<'_, Guard> {
    guard
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Brings the internal session into line with the identity provider.
pub struct Reconciler {
    store: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityProvider>,
    transport: Arc<dyn VerifyTransport>,
    exchange_timeout: Duration,
    guard: Mutex<Guard>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityProvider>,
        transport: Arc<dyn VerifyTransport>,
        exchange_timeout: Duration,
    ) -> Self {
        Self {
            store,
            identity,
            transport,
            exchange_timeout,
            guard: Mutex::new(Guard::default()),
        }
    }

    /// Forget the last processed identity report so the next one is
    /// reconciled from scratch. Called after any local sign-out.
    pub(crate) fn reset(&self) {
        lock_guard(&self.guard).last_seen = None;
    }

    pub(crate) async fn reconcile(
        self: &Arc<Self>,
        cell: &Arc<SessionCell>,
        snapshot: &IdentitySnapshot,
    ) -> ReconcileOutcome {
        let fingerprint = snapshot.fingerprint();
        {
            let guard = lock_guard(&self.guard);
            if guard.in_flight.is_some() {
                tracing::debug!("token exchange already in flight; suppressing");
                return ReconcileOutcome::Suppressed;
            }
            if guard.last_seen.as_ref() == Some(&fingerprint) {
                return ReconcileOutcome::Unchanged;
            }
        }

        let stored = self.store.read();
        let (current, generation) = cell.current();
        let transition = plan(current.phase(), snapshot, &stored);
        tracing::debug!(
            phase = current.phase().as_str(),
            sdk_loading = snapshot.is_loading,
            sdk_authenticated = snapshot.is_authenticated,
            ?transition,
            "reconciling identity"
        );

        match transition {
            Transition::Wait => {
                self.mark_seen(fingerprint);
                ReconcileOutcome::Waiting
            }
            Transition::Keep => {
                self.mark_seen(fingerprint);
                ReconcileOutcome::Unchanged
            }
            Transition::Restore => {
                self.mark_seen(fingerprint);
                self.restore(cell, &stored)
            }
            Transition::SignOut => {
                self.mark_seen(fingerprint);
                cell.update(|state| {
                    // Half-written leftovers never survive a settled sign-out.
                    if !stored.is_empty() {
                        self.store.clear();
                    }
                    state.session = Session::signed_out();
                });
                ReconcileOutcome::SignedOut
            }
            Transition::Exchange => self.spawn_exchange(cell, fingerprint, generation).await,
        }
    }

    /// The exchange belongs to the session, not to the caller: it runs on its
    /// own task and finishes even if the awaiting future is dropped.
    async fn spawn_exchange(
        self: &Arc<Self>,
        cell: &Arc<SessionCell>,
        fingerprint: IdentityFingerprint,
        generation: u64,
    ) -> ReconcileOutcome {
        {
            let mut guard = lock_guard(&self.guard);
            if guard.in_flight.is_some() {
                return ReconcileOutcome::Suppressed;
            }
            guard.in_flight = Some(fingerprint.clone());
            guard.last_seen = Some(fingerprint);
        }

        let task = tokio::spawn(Arc::clone(self).exchange(Arc::clone(cell), generation));
        match task.await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(error = %error, "token exchange task failed");
                ReconcileOutcome::Discarded
            }
        }
    }

    fn mark_seen(&self, fingerprint: IdentityFingerprint) {
        lock_guard(&self.guard).last_seen = Some(fingerprint);
    }

    fn restore(&self, cell: &SessionCell, stored: &PersistedSession) -> ReconcileOutcome {
        let Some((token, user)) = stored.complete() else {
            return ReconcileOutcome::Unchanged;
        };
        cell.update(|state| {
            state.session = Session::established(token, user.clone());
        });
        tracing::info!(user_id = %user.id, "session restored from storage");
        ReconcileOutcome::Restored
    }

    async fn exchange(
        self: Arc<Self>,
        cell: Arc<SessionCell>,
        generation: u64,
    ) -> ReconcileOutcome {
        let _in_flight = InFlight {
            guard: &self.guard,
            cell: &cell,
            generation,
        };

        let started = cell.update(|state| {
            if state.generation != generation {
                return false;
            }
            state.session = Session::empty().with_phase(SessionPhase::Reconciling);
            true
        });
        if !started {
            return ReconcileOutcome::Discarded;
        }

        let timeout_ms = u64::try_from(self.exchange_timeout.as_millis()).unwrap_or(u64::MAX);
        let result = match tokio::time::timeout(self.exchange_timeout, self.fetch_session()).await
        {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Timeout(timeout_ms)),
        };

        cell.update(|state| {
            if state.generation != generation || state.session.phase() != SessionPhase::Reconciling
            {
                tracing::debug!("session settled elsewhere during exchange; discarding result");
                return ReconcileOutcome::Discarded;
            }
            let failure = match result {
                Ok(verified) => match self.store.write(&verified.token, &verified.user) {
                    Ok(()) => {
                        tracing::info!(user_id = %verified.user.id, "session established by token exchange");
                        state.session = Session::established(verified.token, verified.user);
                        return ReconcileOutcome::Exchanged;
                    }
                    Err(error) => ReconcileError::from(error),
                },
                Err(error) => error,
            };
            tracing::warn!(error = %failure, "token exchange failed; signing out locally");
            self.store.clear();
            state.session = Session::signed_out();
            ReconcileOutcome::ExchangeFailed(failure)
        })
    }

    async fn fetch_session(&self) -> Result<VerifiedSession, ReconcileError> {
        let identity_token = self.identity.access_token().await?;
        let verified = self.transport.verify(&identity_token).await?;
        Ok(verified)
    }
}
