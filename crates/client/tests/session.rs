mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use finsight_client::session::{Credential, MemoryCredentialStore, SessionManager};
use finsight_client::transport::Method;
use finsight_client::{
    ClientConfig, ClientError, ClientState, QueryKey, SessionState, VerifyMode,
};

use support::FakeTransport;

fn state_with(
    transport: Arc<FakeTransport>,
    store: Arc<MemoryCredentialStore>,
    mode: VerifyMode,
) -> ClientState {
    let config = ClientConfig {
        verify_mode: mode,
        ..ClientConfig::default()
    };
    let session = Arc::new(SessionManager::new(store, mode));
    ClientState::with_transport(config, session, transport)
}

#[tokio::test(start_paused = true)]
async fn bootstrap_is_authenticated_before_verification_resolves() {
    let transport = FakeTransport::with_delay(Duration::from_secs(3), |_| Ok(json!({"id": 1})));
    let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok")));
    let state = state_with(transport.clone(), store, VerifyMode::Optimistic);

    let bootstrap = state.bootstrap().await;

    assert_eq!(state.session_state(), SessionState::OPTIMISTIC);
    assert!(state.require_session().is_ok());
    assert_eq!(bootstrap.settled().await, SessionState::VERIFIED);
    assert_eq!(transport.count(Method::Get, "/me"), 1);
}

#[tokio::test]
async fn failed_verification_purges_credential() {
    let transport = FakeTransport::new(|_| Err(ClientError::Auth("token expired".to_string())));
    let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("old")));
    let state = state_with(transport, store.clone(), VerifyMode::Optimistic);
    let mut updates = state.session.subscribe();

    state.bootstrap().await.settled().await;

    assert_eq!(state.session_state(), SessionState::SIGNED_OUT);
    assert_eq!(store.current(), None);
    assert!(matches!(state.require_session(), Err(ClientError::Auth(_))));
    updates.changed().await.ok();
    assert_eq!(*updates.borrow(), SessionState::SIGNED_OUT);
}

#[tokio::test]
async fn network_failure_during_verification_also_signs_out() {
    let transport =
        FakeTransport::new(|_| Err(ClientError::TransientNetwork("connection refused".to_string())));
    let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok")));
    let state = state_with(transport.clone(), store.clone(), VerifyMode::Blocking);

    let outcome = state.bootstrap().await.settled().await;

    assert_eq!(outcome, SessionState::SIGNED_OUT);
    assert_eq!(store.current(), None);
    assert_eq!(transport.count(Method::Get, "/me"), 1);
}

#[tokio::test]
async fn login_persists_credential_and_clears_cache() {
    let transport = FakeTransport::new(|request| match request.path.as_str() {
        "/auth/login" => Ok(json!({"access_token": "tok1"})),
        _ => Ok(json!({"data": [], "total": 0})),
    });
    let store = Arc::new(MemoryCredentialStore::new());
    let state = state_with(transport.clone(), store.clone(), VerifyMode::Optimistic);
    let query = state.api.transactions.list_query(&Default::default());
    query.get(&state.cache).await.expect("anonymous read");

    let session = state.login("owner@example.com", "secret").await.expect("login");

    assert_eq!(session, SessionState::VERIFIED);
    assert_eq!(store.current(), Some(Credential::new("tok1")));
    assert!(state.cache.snapshot(&query.key).is_none());
    let login = &transport.calls()[1];
    assert_eq!(login.method, Method::Post);
    assert_eq!(
        login.body,
        finsight_client::transport::RequestBody::Json(json!({
            "identifier": "owner@example.com",
            "password": "secret",
        }))
    );
}

#[tokio::test]
async fn rejected_login_leaves_session_signed_out() {
    let transport = FakeTransport::new(|_| Err(ClientError::Auth("invalid credentials".to_string())));
    let store = Arc::new(MemoryCredentialStore::new());
    let state = state_with(transport, store.clone(), VerifyMode::Optimistic);

    let err = state.login("owner@example.com", "wrong").await.expect_err("rejected");

    assert_eq!(err.to_string(), "invalid credentials");
    assert_eq!(state.session_state(), SessionState::SIGNED_OUT);
    assert_eq!(store.current(), None);
}

#[tokio::test]
async fn auth_error_on_any_call_forces_logout() {
    let transport = FakeTransport::new(|_| Err(ClientError::Auth("unauthorized".to_string())));
    let state = support::signed_in_state(transport);
    let key = QueryKey::new("forecast");

    let result = state.observe(state.api.ml.forecast_query().get(&state.cache).await);

    assert!(matches!(result, Err(ClientError::Auth(_))));
    assert_eq!(state.session_state(), SessionState::SIGNED_OUT);
    assert!(state.cache.snapshot(&key).is_none());
}

#[tokio::test]
async fn validation_errors_keep_the_session() {
    let transport = FakeTransport::new(|_| Err(ClientError::Validation("bad".to_string())));
    let state = support::signed_in_state(transport);

    let result = state.observe(state.api.ml.classify("coffee").await);

    assert!(matches!(result, Err(ClientError::Validation(_))));
    assert_eq!(state.session_state(), SessionState::VERIFIED);
}

#[test]
fn logout_never_fails_and_repeats_cleanly() {
    let transport = FakeTransport::new(|_| Ok(json!(null)));
    let state = support::signed_in_state(transport);

    assert_eq!(state.logout(), SessionState::SIGNED_OUT);
    assert_eq!(state.logout(), SessionState::SIGNED_OUT);
}
