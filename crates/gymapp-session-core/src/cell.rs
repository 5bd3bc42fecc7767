use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use crate::session::Session;

pub(crate) struct CellState {
    pub(crate) session: Session,
    /// Bumped by every change that does not come from reconciliation
    /// (logout, forced logout, `set_auth_data`). An exchange started under an
    /// older generation must not land.
    pub(crate) generation: u64,
}

/// In-memory session plus its broadcast channel.
///
/// Every mutation happens under one lock and is published exactly once, so
/// subscribers only ever see whole sessions.
pub(crate) struct SessionCell {
    state: Mutex<CellState>,
    tx: watch::Sender<Session>,
}

impl SessionCell {
    pub(crate) fn new(initial: Session) -> Self {
        let (tx, _rx) = watch::channel(initial.clone());
        Self {
            state: Mutex::new(CellState {
                session: initial,
                generation: 0,
            }),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CellState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn current(&self) -> (Session, u64) {
        let state = self.lock();
        (state.session.clone(), state.generation)
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Run `apply` under the lock and publish the session if it changed.
    pub(crate) fn update<R>(&self, apply: impl FnOnce(&mut CellState) -> R) -> R {
        let mut state = self.lock();
        let before = state.session.clone();
        let result = apply(&mut state);
        if state.session != before {
            tracing::debug!(
                from = before.phase().as_str(),
                to = state.session.phase().as_str(),
                "session phase changed"
            );
            self.tx.send_replace(state.session.clone());
        }
        result
    }
}
