use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Profile as the third-party identity provider reports it. Unrelated to the
/// backend's `SessionUser` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl IdentityProfile {
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            email: None,
            name: None,
        }
    }
}

/// Read-only state of the identity SDK at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentitySnapshot {
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub user: Option<IdentityProfile>,
}

impl IdentitySnapshot {
    #[must_use]
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            is_authenticated: false,
            user: None,
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(profile: IdentityProfile) -> Self {
        Self {
            is_loading: false,
            is_authenticated: true,
            user: Some(profile),
        }
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.user.as_ref().map(|profile| profile.subject.as_str())
    }

    /// Stable key for "the SDK reported the same thing again".
    #[must_use]
    pub fn fingerprint(&self) -> IdentityFingerprint {
        IdentityFingerprint {
            is_loading: self.is_loading,
            is_authenticated: self.is_authenticated,
            subject: self.subject().map(ToString::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityFingerprint {
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("identity_not_authenticated")]
    NotAuthenticated,
    #[error("identity_token_unavailable:{message}")]
    TokenUnavailable { message: String },
    #[error("identity_redirect_failed:{message}")]
    Redirect { message: String },
}

/// Seam over the third-party identity SDK.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn snapshot(&self) -> IdentitySnapshot;

    /// Short-lived bearer token for the signed-in identity.
    async fn access_token(&self) -> Result<String, IdentityError>;

    /// Start the provider's interactive sign-in.
    async fn login(&self) -> Result<(), IdentityError>;

    /// End the provider session. Usually navigates away.
    async fn logout(&self) -> Result<(), IdentityError>;
}
