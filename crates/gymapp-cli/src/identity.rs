use async_trait::async_trait;
use gymapp_session_core::{IdentityError, IdentityProfile, IdentityProvider, IdentitySnapshot};

pub const ENV_IDENTITY_TOKEN: &str = "GYMAPP_IDENTITY_TOKEN";
pub const ENV_IDENTITY_SUBJECT: &str = "GYMAPP_IDENTITY_SUBJECT";

/// Identity provider for terminal use: the provider token is handed in
/// (flag or environment) instead of coming from an interactive sign-in.
#[derive(Debug, Clone, Default)]
pub struct TerminalIdentity {
    token: Option<String>,
    subject: Option<String>,
}

impl TerminalIdentity {
    #[must_use]
    pub fn new(token: Option<String>, subject: Option<String>) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            token: clean(token),
            subject: clean(subject),
        }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(ENV_IDENTITY_TOKEN).ok(),
            std::env::var(ENV_IDENTITY_SUBJECT).ok(),
        )
    }

    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            token: self.token.or(fallback.token),
            subject: self.subject.or(fallback.subject),
        }
    }
}

#[async_trait]
impl IdentityProvider for TerminalIdentity {
    fn snapshot(&self) -> IdentitySnapshot {
        if self.token.is_none() {
            return IdentitySnapshot::anonymous();
        }
        let subject = self
            .subject
            .clone()
            .unwrap_or_else(|| "terminal".to_string());
        IdentitySnapshot::authenticated(IdentityProfile::new(subject))
    }

    async fn access_token(&self) -> Result<String, IdentityError> {
        self.token.clone().ok_or(IdentityError::NotAuthenticated)
    }

    async fn login(&self) -> Result<(), IdentityError> {
        Err(IdentityError::Redirect {
            message: format!(
                "interactive sign-in is unavailable here; pass --identity-token or set {ENV_IDENTITY_TOKEN}"
            ),
        })
    }

    async fn logout(&self) -> Result<(), IdentityError> {
        tracing::debug!("no provider session to end in terminal mode");
        Ok(())
    }
}
