use crate::user::SessionUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// The identity provider has not finished its own startup.
    Uninitialized,
    NoSession,
    /// A token exchange is in flight.
    Reconciling,
    Established,
}

impl SessionPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::NoSession => "no_session",
            Self::Reconciling => "reconciling",
            Self::Established => "established",
        }
    }

    #[must_use]
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Reconciling)
    }
}

/// The reconciled session every consumer reads.
///
/// `is_authenticated` is derived on read so it can never drift from the
/// token/user pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    internal_token: Option<String>,
    user: Option<SessionUser>,
    phase: SessionPhase,
}

impl Session {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            internal_token: None,
            user: None,
            phase: SessionPhase::Uninitialized,
        }
    }

    /// Session as known at process start: whatever the store holds, still loading.
    #[must_use]
    pub fn hydrated(stored: &PersistedSession) -> Self {
        let (internal_token, user) = match stored.complete() {
            Some((token, user)) => (Some(token.to_string()), Some(user.clone())),
            None => (None, None),
        };
        Self {
            internal_token,
            user,
            phase: SessionPhase::Uninitialized,
        }
    }

    #[must_use]
    pub fn established(token: impl Into<String>, user: SessionUser) -> Self {
        Self {
            internal_token: Some(token.into()),
            user: Some(user),
            phase: SessionPhase::Established,
        }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self {
            internal_token: None,
            user: None,
            phase: SessionPhase::NoSession,
        }
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase.is_loading()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.is_loading() && self.internal_token.is_some() && self.user.is_some()
    }

    /// Current user, hidden while reconciliation is still running.
    #[must_use]
    pub fn user(&self) -> Option<&SessionUser> {
        if self.is_loading() {
            return None;
        }
        self.user.as_ref()
    }

    #[must_use]
    pub fn internal_token(&self) -> Option<&str> {
        if self.is_loading() {
            return None;
        }
        self.internal_token.as_deref()
    }

    pub(crate) fn with_phase(mut self, phase: SessionPhase) -> Self {
        self.phase = phase;
        self
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::empty()
    }
}

/// Raw view of the persisted entries. Either side may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedSession {
    pub token: Option<String>,
    pub user: Option<SessionUser>,
}

impl PersistedSession {
    #[must_use]
    pub fn complete(&self) -> Option<(&str, &SessionUser)> {
        match (self.token.as_deref(), self.user.as_ref()) {
            (Some(token), Some(user)) if !token.trim().is_empty() => Some((token, user)),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.user.is_none()
    }
}
