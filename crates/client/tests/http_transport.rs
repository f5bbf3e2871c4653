use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;

use finsight_client::session::{Credential, MemoryCredentialStore};
use finsight_client::{
    ApiRequest, ClientConfig, ClientError, ClientState, SessionState, UploadFile, VerifyMode,
};
use finsight_core::{TransactionDraft, TransactionFilter, TransactionType};
use finsight_stub::StubState;

async fn serve(state: &StubState) -> String {
    let (addr, _server) = finsight_stub::spawn(state.clone(), SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind stub");
    format!("http://{}", addr)
}

fn client(api_url: String, store: Arc<MemoryCredentialStore>) -> ClientState {
    let config = ClientConfig {
        api_url,
        verify_mode: VerifyMode::Blocking,
        ..ClientConfig::default()
    };
    ClientState::new(config, store).expect("client state")
}

async fn signed_in() -> (StubState, ClientState) {
    let stub = StubState::new();
    stub.seed_user("owner@example.com", "secret");
    stub.queue_token("tok1");
    let url = serve(&stub).await;
    let state = client(url, Arc::new(MemoryCredentialStore::new()));
    state.login("owner@example.com", "secret").await.expect("login");
    (stub, state)
}

#[tokio::test]
async fn login_token_is_sent_as_bearer() {
    let (stub, state) = signed_in().await;

    let profile = state.api.auth.me().await.expect("profile");

    assert_eq!(profile.email.as_deref(), Some("owner@example.com"));
    let calls = stub.requests_to("GET", "/me");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].bearer.as_deref(), Some("tok1"));
}

#[tokio::test]
async fn unknown_stored_credential_is_purged_at_bootstrap() {
    let stub = StubState::new();
    let url = serve(&stub).await;
    let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("stale")));
    let state = client(url, store.clone());

    let settled = state.bootstrap().await.settled().await;

    assert_eq!(settled, SessionState::SIGNED_OUT);
    assert_eq!(store.current(), None);
    assert_eq!(
        stub.requests_to("GET", "/me")[0].bearer.as_deref(),
        Some("stale")
    );
}

#[tokio::test]
async fn empty_account_reads_as_empty_states() {
    let (_stub, state) = signed_in().await;

    let page = state
        .api
        .transactions
        .list_query(&TransactionFilter::default())
        .get(&state.cache)
        .await
        .expect("page");
    let forecast = state.api.ml.forecast_query().get(&state.cache).await.expect("forecast");

    assert!(page.is_empty());
    assert_eq!(page.total, 0);
    assert_eq!(forecast.method, "insufficient_data");
    assert!(forecast.forecast.is_empty());
}

#[tokio::test]
async fn import_then_refetch_shows_new_rows() {
    let (stub, state) = signed_in().await;
    let list = state.api.transactions.list_query(&TransactionFilter::default());
    assert_eq!(list.get(&state.cache).await.expect("before").total, 0);
    let mut sheet = String::from("Date,Amount,Description,Category\n");
    for day in 1..=7 {
        sheet.push_str(&format!("2025-03-0{},-{}.50,Item {},\n", day, day * 10, day));
    }

    let batch = state
        .bulk_import()
        .upload(UploadFile::new("march.xlsx", "application/vnd.ms-excel", sheet.into_bytes()))
        .await
        .expect("import");
    let page = list.get(&state.cache).await.expect("after");

    assert_eq!(batch.imported_count, 7);
    assert_eq!(page.total, 7);
    assert_eq!(page.data.len(), 7);
    assert_eq!(stub.requests_to("GET", "/transactions").len(), 2);
}

#[tokio::test]
async fn backend_errors_are_normalized() {
    let (_stub, state) = signed_in().await;

    let plain = state
        .mutations
        .create_transaction(&TransactionDraft {
            amount: 0.0,
            kind: TransactionType::Expense,
            category: None,
            description: "Nothing".to_string(),
            date: "2025-03-01".to_string(),
        })
        .await
        .expect_err("rejected");
    let detail = state
        .transport
        .send(
            ApiRequest::post("/chat")
                .with_json(&json!({"message": " ", "history": []}))
                .expect("json"),
        )
        .await
        .expect_err("rejected");

    assert_eq!(plain, ClientError::Validation("amount must be positive".to_string()));
    assert_eq!(detail, ClientError::Validation("message is required".to_string()));
}

#[tokio::test]
async fn logout_drops_bearer_from_later_requests() {
    let (stub, state) = signed_in().await;
    state.logout();

    let err = state.api.auth.me().await.expect_err("signed out");

    assert!(err.is_auth());
    assert_eq!(stub.requests_to("GET", "/me")[0].bearer, None);
}
