use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use gymapp_session_core::{
    ClearStoreAndRedirect, ExchangeError, Navigator, SessionStore, UnauthorizedHandler,
    VerifiedSession, VerifyTransport,
};
use reqwest::{Method, StatusCode, header};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::{ApiClientConfig, AppVariant, MIN_TIMEOUT_MS, normalize_base_url};
use crate::envelope::{self, EnvelopeError};
use crate::{ApiError, format_http_error, response_body_text};

pub const SELECT_ROLE_PATH: &str = "/auth/select-role";

/// The one HTTP client every screen goes through.
///
/// Each dispatch reads the token from the session store, so a token written
/// by reconciliation is on the very next request. Any 401 signs the session
/// out before the error reaches the caller.
pub struct ApiClient {
    base_url: String,
    variant: AppVariant,
    timeout: Duration,
    request_attempts: usize,
    http: reqwest::Client,
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    session: RwLock<Option<Weak<dyn UnauthorizedHandler>>>,
}

impl ApiClient {
    pub fn new(
        config: ApiClientConfig,
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            variant: config.variant,
            timeout: Duration::from_millis(config.timeout_ms.max(MIN_TIMEOUT_MS)),
            request_attempts: config.request_attempts.max(1),
            http: reqwest::Client::new(),
            store,
            navigator,
            session: RwLock::new(None),
        })
    }

    /// Route 401s through a live session owner instead of the bare store.
    /// Held weakly; the session owner usually holds this client as its
    /// verification transport.
    pub fn attach_session<H>(&self, handler: &Arc<H>)
    where
        H: UnauthorizedHandler + 'static,
    {
        let weak: Weak<dyn UnauthorizedHandler> = Arc::downgrade(handler) as Weak<H>;
        let mut slot = self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(weak);
    }

    #[must_use]
    pub fn variant(&self) -> AppVariant {
        self.variant
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T, ApiError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let response = self.send(Method::GET, path, None).await?;
        decode_json_response(response).await
    }

    /// GET a collection and return its rows whatever the wrapper.
    pub async fn get_list(&self, path: &str) -> Result<Vec<Value>, ApiError> {
        let body: Value = self.get_json(path).await?;
        let data = envelope::unwrap_data(body).map_err(envelope_error)?;
        Ok(envelope::normalize_list(&data))
    }

    pub async fn post_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, ApiError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        self.send_with_body(Method::POST, path, payload).await
    }

    pub async fn put_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, ApiError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        self.send_with_body(Method::PUT, path, payload).await
    }

    pub async fn patch_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, ApiError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        self.send_with_body(Method::PATCH, path, payload).await
    }

    pub async fn delete_json<T>(&self, path: &str) -> Result<T, ApiError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let response = self.send(Method::DELETE, path, None).await?;
        decode_json_response(response).await
    }

    /// Ask the backend to re-issue the session for another role.
    pub async fn select_role(&self, role: &str) -> Result<VerifiedSession, ApiError> {
        let role = role.trim();
        if role.is_empty() {
            return Err(ApiError::Rejected {
                message: "role must not be empty".to_string(),
            });
        }
        let body: Value = self
            .post_json(SELECT_ROLE_PATH, &serde_json::json!({ "role": role }))
            .await?;
        envelope::decode_session_payload(body).map_err(envelope_error)
    }

    async fn send_with_body<Req, Res>(
        &self,
        method: Method,
        path: &str,
        payload: &Req,
    ) -> Result<Res, ApiError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        let body = serde_json::to_value(payload).map_err(|error| ApiError::Encode {
            message: error.to_string(),
        })?;
        let response = self.send(method, path, Some(&body)).await?;
        decode_json_response(response).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(path).ok_or(ApiError::InvalidPath)?;
        // Only reads are safe to resend after a transport failure.
        let attempts = if method == Method::GET {
            self.request_attempts
        } else {
            1
        };
        let mut last_error = None;

        for attempt in 0..attempts {
            let mut request = self
                .http
                .request(method.clone(), url.as_str())
                .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
                .timeout(self.timeout);
            if let Some(token) = self.store.token() {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    if response.status() == StatusCode::UNAUTHORIZED {
                        self.force_logout();
                        return Err(ApiError::Unauthorized);
                    }
                    return Ok(response);
                }
                Err(error) => {
                    tracing::debug!(%method, path, attempt, error = %error, "request failed");
                    last_error = Some(error);
                    if attempt + 1 >= attempts {
                        break;
                    }
                }
            }
        }

        Err(match last_error {
            Some(error) => transport_error(&error),
            None => ApiError::Request {
                message: "unknown".to_string(),
            },
        })
    }

    fn force_logout(&self) {
        let attached = self
            .session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .and_then(Weak::upgrade);
        match attached {
            Some(handler) => handler.force_logout(),
            None => {
                ClearStoreAndRedirect::new(self.store.clone(), self.navigator.clone())
                    .force_logout();
            }
        }
    }
}

#[async_trait]
impl VerifyTransport for ApiClient {
    /// Exchange the identity provider's token. This call carries the provider
    /// token instead of the internal one and is never resent.
    async fn verify(&self, identity_token: &str) -> Result<VerifiedSession, ExchangeError> {
        let url = self
            .endpoint(self.variant.verify_path())
            .ok_or_else(|| ExchangeError::Transport {
                message: "verify endpoint unavailable".to_string(),
            })?;
        let response = self
            .http
            .post(url.as_str())
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
            .header(header::AUTHORIZATION, format!("Bearer {identity_token}"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    ExchangeError::Timeout
                } else {
                    ExchangeError::Transport {
                        message: error.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| ExchangeError::Transport {
                message: error.to_string(),
            })?;
        if !status.is_success() {
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body: response_body_text(&bytes),
            });
        }

        let body = serde_json::from_slice::<Value>(&bytes).map_err(|error| {
            ExchangeError::Malformed {
                message: error.to_string(),
            }
        })?;
        envelope::decode_session_payload(body).map_err(|error| match error {
            EnvelopeError::Rejected(message) => ExchangeError::Rejected { message },
            EnvelopeError::Malformed(message) => ExchangeError::Malformed { message },
        })
    }
}

fn transport_error(error: &reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Request {
            message: error.to_string(),
        }
    }
}

fn envelope_error(error: EnvelopeError) -> ApiError {
    match error {
        EnvelopeError::Rejected(message) => ApiError::Rejected { message },
        EnvelopeError::Malformed(message) => ApiError::Decode { message },
    }
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, ApiError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    let bytes = response.bytes().await.map_err(|error| ApiError::Read {
        message: error.to_string(),
    })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_value::<T>(Value::Null).map_err(|error| ApiError::Decode {
            message: error.to_string(),
        });
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| ApiError::Decode {
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gymapp_session_core::{LoggingNavigator, MemorySessionStore};

    fn client(base_url: &str) -> Result<ApiClient, ApiError> {
        ApiClient::new(
            ApiClientConfig::new(base_url),
            Arc::new(MemorySessionStore::new()),
            Arc::new(LoggingNavigator::default()),
        )
    }

    #[test]
    fn endpoint_builder_normalizes_paths() {
        let client = client("https://api.gym.test/api/").expect("client");
        assert_eq!(
            client.endpoint("/gyms"),
            Some("https://api.gym.test/api/gyms".to_string())
        );
        assert_eq!(
            client.endpoint("gyms/7/trainers"),
            Some("https://api.gym.test/api/gyms/7/trainers".to_string())
        );
        assert_eq!(client.endpoint("  "), None);
    }

    #[test]
    fn base_url_must_be_present_and_http() {
        assert!(matches!(client("   "), Err(ApiError::BaseUrlMissing)));
        assert!(matches!(client("ftp://gym.test"), Err(ApiError::InvalidBaseUrl)));
        assert!(matches!(client("https:///api"), Err(ApiError::InvalidBaseUrl)));
    }

    #[test]
    fn success_false_maps_to_rejected() {
        let error = envelope::unwrap_data(serde_json::json!({ "success": false, "message": "no" }))
            .map_err(envelope_error)
            .err();
        assert!(matches!(error, Some(ApiError::Rejected { message }) if message == "no"));
    }
}
