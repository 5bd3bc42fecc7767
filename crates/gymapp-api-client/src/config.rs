use crate::ApiError;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const MIN_TIMEOUT_MS: u64 = 250;
pub const DEFAULT_REQUEST_ATTEMPTS: usize = 2;

pub const ENV_API_BASE_URL: &str = "GYMAPP_API_BASE_URL";
pub const ENV_API_BASE_URL_LEGACY: &str = "GYMAPP_BACKEND_URL";
pub const ENV_APP_VARIANT: &str = "GYMAPP_APP_VARIANT";
pub const ENV_API_TIMEOUT_MS: &str = "GYMAPP_API_TIMEOUT_MS";
pub const ENV_REQUEST_ATTEMPTS: &str = "GYMAPP_REQUEST_ATTEMPTS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid GYMAPP_API_BASE_URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid GYMAPP_APP_VARIANT: {0}")]
    InvalidVariant(String),
    #[error("invalid GYMAPP_API_TIMEOUT_MS: {0}")]
    InvalidTimeout(String),
    #[error("invalid GYMAPP_REQUEST_ATTEMPTS: {0}")]
    InvalidRequestAttempts(String),
}

/// Which front end the client speaks for. Only the verification route differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppVariant {
    #[default]
    Gymapp,
    Admin,
}

impl AppVariant {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gymapp" | "app" | "client" => Some(Self::Gymapp),
            "admin" | "gym-admin" | "gym_admin" => Some(Self::Admin),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gymapp => "gymapp",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn verify_path(self) -> &'static str {
        match self {
            Self::Gymapp => "/auth/verify-user",
            Self::Admin => "/auth/verify-user-admin",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub variant: AppVariant,
    pub timeout_ms: u64,
    pub request_attempts: usize,
}

impl ApiClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            variant: AppVariant::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_attempts: DEFAULT_REQUEST_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_variant(mut self, variant: AppVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Resolve from the environment, falling back to local defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let raw_base_url = lookup(ENV_API_BASE_URL)
            .or_else(|| lookup(ENV_API_BASE_URL_LEGACY))
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let base_url = normalize_base_url(&raw_base_url)
            .map_err(|_| ConfigError::InvalidBaseUrl(raw_base_url.clone()))?;

        let variant = match lookup(ENV_APP_VARIANT) {
            Some(raw) => AppVariant::parse(&raw).ok_or(ConfigError::InvalidVariant(raw))?,
            None => AppVariant::default(),
        };
        let timeout_ms = match lookup(ENV_API_TIMEOUT_MS) {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|error| ConfigError::InvalidTimeout(error.to_string()))?,
            None => DEFAULT_TIMEOUT_MS,
        };
        let request_attempts = match lookup(ENV_REQUEST_ATTEMPTS) {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|error| ConfigError::InvalidRequestAttempts(error.to_string()))?,
            None => DEFAULT_REQUEST_ATTEMPTS,
        };

        Ok(Self {
            base_url,
            variant,
            timeout_ms,
            request_attempts,
        })
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ApiError::BaseUrlMissing);
    }
    let Some((scheme, remainder)) = trimmed.split_once("://") else {
        return Err(ApiError::InvalidBaseUrl);
    };
    if !matches!(scheme, "http" | "https") || remainder.is_empty() || remainder.starts_with('/') {
        return Err(ApiError::InvalidBaseUrl);
    }
    Ok(trimmed.to_string())
}
