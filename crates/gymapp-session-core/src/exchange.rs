use async_trait::async_trait;

use crate::user::SessionUser;

/// Internal token and user issued by the backend for a verified identity.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedSession {
    pub token: String,
    pub user: SessionUser,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("exchange_request_failed:{message}")]
    Transport { message: String },
    #[error("exchange_timed_out")]
    Timeout,
    #[error("exchange_http_{status}:{body}")]
    Http { status: u16, body: String },
    #[error("exchange_rejected:{message}")]
    Rejected { message: String },
    #[error("exchange_malformed_response:{message}")]
    Malformed { message: String },
}

/// Trades a third-party bearer token for an internal session.
#[async_trait]
pub trait VerifyTransport: Send + Sync {
    async fn verify(&self, identity_token: &str) -> Result<VerifiedSession, ExchangeError>;
}
