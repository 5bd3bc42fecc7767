//! HTTP side of the gymapp session: the shared request pipeline and the
//! token-exchange transport it provides to the session core.

use reqwest::StatusCode;
use thiserror::Error;

mod client;
pub mod config;
pub mod envelope;

pub use client::{ApiClient, SELECT_ROLE_PATH};
pub use config::{ApiClientConfig, AppVariant, ConfigError};
pub use envelope::{normalize_list, unwrap_data};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("api_base_url_missing")]
    BaseUrlMissing,
    #[error("api_base_url_invalid")]
    InvalidBaseUrl,
    #[error("api_invalid_path")]
    InvalidPath,
    /// The backend answered 401; the session has already been signed out.
    #[error("api_unauthorized")]
    Unauthorized,
    #[error("api_request_timed_out")]
    Timeout,
    #[error("api_request_failed:{message}")]
    Request { message: String },
    #[error("api_read_failed:{message}")]
    Read { message: String },
    #[error("api_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("api_json_encode_failed:{message}")]
    Encode { message: String },
    #[error("api_json_decode_failed:{message}")]
    Decode { message: String },
    #[error("api_rejected:{message}")]
    Rejected { message: String },
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> ApiError {
    ApiError::Http {
        status,
        body: response_body_text(body),
    }
}

pub(crate) fn response_body_text(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "<empty>".to_string()
    } else {
        trimmed.to_string()
    }
}
