use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use gymapp_api_client::{ApiClient, ApiClientConfig, ApiError, AppVariant};
use gymapp_session_core::{
    ExchangeError, IdentityError, IdentityProfile, IdentityProvider, IdentitySnapshot,
    MemorySessionStore, Navigator, ReconcileOutcome, SessionContext, SessionDeps, SessionStore,
    SessionUser, VerifyTransport,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Clone, Default)]
struct StubState {
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
    verify_calls: Arc<AtomicUsize>,
}

struct BackendStub {
    base_url: String,
    state: StubState,
    _shutdown: oneshot::Sender<()>,
}

impl BackendStub {
    fn auth_headers(&self) -> Vec<Option<String>> {
        self.state
            .auth_headers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

async fn me(State(state): State<StubState>, headers: HeaderMap) -> Json<Value> {
    let auth = authorization(&headers);
    state
        .auth_headers
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(auth.clone());
    Json(json!({ "success": true, "data": { "authorization": auth } }))
}

async fn expired() -> impl IntoResponse {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "message": "jwt expired" })),
    )
}

async fn broken() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!({ "success": true }))
}

async fn gyms() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": { "docs": [{ "_id": "g1" }, { "_id": "g2" }], "total": 2 }
    }))
}

async fn verify_user(State(state): State<StubState>, headers: HeaderMap) -> impl IntoResponse {
    state.verify_calls.fetch_add(1, Ordering::SeqCst);
    match authorization(&headers).as_deref() {
        Some("Bearer good-identity") => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "token": "T2", "user": { "_id": "u2", "role": "trainer" } }
            })),
        ),
        Some("Bearer disabled-identity") => (
            StatusCode::OK,
            Json(json!({ "success": false, "message": "user disabled" })),
        ),
        Some("Bearer bare-identity") => (
            StatusCode::OK,
            Json(json!({ "token": "T3", "user": { "_id": "u3" } })),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "invalid identity token" })),
        ),
    }
}

async fn verify_admin(headers: HeaderMap) -> impl IntoResponse {
    match authorization(&headers).as_deref() {
        Some("Bearer good-identity") => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "token": "A1", "user": { "id": 7, "role": "admin" } }
            })),
        ),
        _ => (StatusCode::FORBIDDEN, Json(json!({ "success": false }))),
    }
}

async fn select_role(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if authorization(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "success": false })));
    }
    let role = body["role"].as_str().unwrap_or_default().to_string();
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": { "token": format!("T-{role}"), "user": { "_id": "u2", "role": role } }
        })),
    )
}

async fn spawn_backend() -> Result<BackendStub> {
    let state = StubState::default();
    let app = Router::new()
        .route("/api/me", get(me))
        .route("/api/expired", get(expired).post(expired))
        .route("/api/broken", get(broken))
        .route("/api/slow", get(slow))
        .route("/api/gyms", get(gyms))
        .route("/api/auth/verify-user", post(verify_user))
        .route("/api/auth/verify-user-admin", post(verify_admin))
        .route("/api/auth/select-role", post(select_role))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        let _ = server.await;
    });

    Ok(BackendStub {
        base_url: format!("http://{addr}/api"),
        state,
        _shutdown: shutdown_tx,
    })
}

#[derive(Default)]
struct CountingNavigator {
    redirects: AtomicUsize,
}

impl Navigator for CountingNavigator {
    fn redirect_to_entry(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

struct StaticIdentity {
    token: String,
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    fn snapshot(&self) -> IdentitySnapshot {
        IdentitySnapshot::authenticated(IdentityProfile::new("auth0|trainer"))
    }

    async fn access_token(&self) -> Result<String, IdentityError> {
        Ok(self.token.clone())
    }

    async fn login(&self) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn logout(&self) -> Result<(), IdentityError> {
        Ok(())
    }
}

fn build_client(
    stub: &BackendStub,
    store: Arc<MemorySessionStore>,
    navigator: Arc<CountingNavigator>,
) -> Result<ApiClient> {
    Ok(ApiClient::new(
        ApiClientConfig::new(stub.base_url.clone()),
        store,
        navigator,
    )?)
}

#[tokio::test]
async fn requests_carry_the_token_current_at_dispatch() -> Result<()> {
    let stub = spawn_backend().await?;
    let store = Arc::new(MemorySessionStore::new());
    let client = build_client(&stub, store.clone(), Arc::default())?;

    let _: Value = client.get_json("/me").await?;
    store.write("T1", &SessionUser::new("u1"))?;
    let _: Value = client.get_json("/me").await?;
    store.write("T9", &SessionUser::new("u1"))?;
    let body: Value = client.get_json("me").await?;
    store.clear();
    let _: Value = client.get_json("/me").await?;

    assert_eq!(body["data"]["authorization"], "Bearer T9");
    assert_eq!(
        stub.auth_headers(),
        vec![
            None,
            Some("Bearer T1".to_string()),
            Some("Bearer T9".to_string()),
            None,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn unauthorized_response_clears_store_then_redirects() -> Result<()> {
    let stub = spawn_backend().await?;
    let store = Arc::new(MemorySessionStore::new());
    store.write("T1", &SessionUser::new("u1"))?;
    let navigator = Arc::new(CountingNavigator::default());
    let client = build_client(&stub, store.clone(), navigator.clone())?;

    let result: Result<Value, ApiError> = client.post_json("/expired", &json!({})).await;

    assert!(matches!(result, Err(ApiError::Unauthorized)));
    assert!(store.read().is_empty());
    assert_eq!(navigator.redirects.load(Ordering::SeqCst), 1);

    let _: Value = client.get_json("/me").await?;
    assert_eq!(stub.auth_headers(), vec![None]);
    Ok(())
}

#[tokio::test]
async fn other_failures_reach_the_caller_untouched() -> Result<()> {
    let stub = spawn_backend().await?;
    let store = Arc::new(MemorySessionStore::new());
    store.write("T1", &SessionUser::new("u1"))?;
    let navigator = Arc::new(CountingNavigator::default());
    let client = build_client(&stub, store.clone(), navigator.clone())?;

    let result: Result<Value, ApiError> = client.get_json("/broken").await;
    match result {
        Err(ApiError::Http { status, body }) => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "boom");
        }
        other => anyhow::bail!("expected http error, got {other:?}"),
    }
    assert_eq!(store.token().as_deref(), Some("T1"));
    assert_eq!(navigator.redirects.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn slow_backend_times_out() -> Result<()> {
    let stub = spawn_backend().await?;
    let mut config = ApiClientConfig::new(stub.base_url.clone());
    config.timeout_ms = 250;
    config.request_attempts = 1;
    let client = ApiClient::new(
        config,
        Arc::new(MemorySessionStore::new()),
        Arc::new(CountingNavigator::default()),
    )?;

    let result: Result<Value, ApiError> = client.get_json("/slow").await;
    assert!(matches!(result, Err(ApiError::Timeout)));
    Ok(())
}

#[tokio::test]
async fn list_rows_are_normalized() -> Result<()> {
    let stub = spawn_backend().await?;
    let client = build_client(&stub, Arc::default(), Arc::default())?;
    let rows = client.get_list("/gyms").await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["_id"], "g1");
    Ok(())
}

#[tokio::test]
async fn verify_sends_identity_token_not_session_token() -> Result<()> {
    let stub = spawn_backend().await?;
    let store = Arc::new(MemorySessionStore::new());
    store.write("stale-internal", &SessionUser::new("u0"))?;
    let navigator = Arc::new(CountingNavigator::default());
    let client = build_client(&stub, store.clone(), navigator.clone())?;

    let verified = client.verify("good-identity").await?;
    assert_eq!(verified.token, "T2");
    assert_eq!(verified.user.id, "u2");

    let rejected = client.verify("disabled-identity").await;
    assert_eq!(
        rejected,
        Err(ExchangeError::Rejected {
            message: "user disabled".to_string()
        })
    );

    let unauthorized = client.verify("forged").await;
    assert!(matches!(
        unauthorized,
        Err(ExchangeError::Http { status: 401, .. })
    ));
    let unwrapped = client.verify("bare-identity").await;
    assert!(matches!(unwrapped, Err(ExchangeError::Malformed { .. })));

    // Verification failures are left to the reconciler.
    assert_eq!(navigator.redirects.load(Ordering::SeqCst), 0);
    assert_eq!(store.token().as_deref(), Some("stale-internal"));
    assert_eq!(stub.state.verify_calls.load(Ordering::SeqCst), 4);
    Ok(())
}

#[tokio::test]
async fn admin_variant_uses_admin_verification_route() -> Result<()> {
    let stub = spawn_backend().await?;
    let client = ApiClient::new(
        ApiClientConfig::new(stub.base_url.clone()).with_variant(AppVariant::Admin),
        Arc::new(MemorySessionStore::new()),
        Arc::new(CountingNavigator::default()),
    )?;

    let verified = client.verify("good-identity").await?;
    assert_eq!(verified.token, "A1");
    assert_eq!(verified.user.id, "7");
    assert_eq!(stub.state.verify_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn session_context_reconciles_through_the_pipeline() -> Result<()> {
    let stub = spawn_backend().await?;
    let store = Arc::new(MemorySessionStore::new());
    let navigator = Arc::new(CountingNavigator::default());
    let client = Arc::new(build_client(&stub, store.clone(), navigator.clone())?);
    let context = Arc::new(SessionContext::new(SessionDeps::new(
        store.clone(),
        Arc::new(StaticIdentity {
            token: "good-identity".to_string(),
        }),
        client.clone(),
        navigator.clone(),
    )));
    client.attach_session(&context);

    assert_eq!(context.sync_identity().await, ReconcileOutcome::Exchanged);
    assert!(context.is_authenticated());
    let _: Value = client.get_json("/me").await?;
    assert_eq!(stub.auth_headers(), vec![Some("Bearer T2".to_string())]);

    let reissued = client.select_role("merchant").await?;
    context.set_auth_data(reissued.token, reissued.user)?;
    assert_eq!(store.token().as_deref(), Some("T-merchant"));
    assert_eq!(
        context.session().user().and_then(|user| user.role.clone()),
        Some("merchant".to_string())
    );

    let result: Result<Value, ApiError> = client.get_json("/expired").await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
    assert!(!context.is_authenticated());
    assert!(store.read().is_empty());
    assert_eq!(navigator.redirects.load(Ordering::SeqCst), 1);
    Ok(())
}
