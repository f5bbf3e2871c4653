#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use finsight_client::session::{Credential, MemoryCredentialStore, SessionManager};
use finsight_client::transport::Method;
use finsight_client::{ApiRequest, ApiResponse, ClientConfig, ClientState, Result, Transport};

type Responder = dyn Fn(&ApiRequest) -> Result<Value> + Send + Sync;

/// Scripted backend: every request is logged, then answered by `responder`
/// after an optional delay.
pub struct FakeTransport {
    responder: Box<Responder>,
    delay: Duration,
    calls: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn new(responder: impl Fn(&ApiRequest) -> Result<Value> + Send + Sync + 'static) -> Arc<Self> {
        Self::with_delay(Duration::ZERO, responder)
    }

    pub fn with_delay(
        delay: Duration,
        responder: impl Fn(&ApiRequest) -> Result<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.calls.lock().expect("calls").push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let body = (self.responder)(&request)?;
        Ok(ApiResponse { status: 200, body })
    }
}

/// Client state over `transport`, already holding credential `tok`.
pub fn signed_in_state(transport: Arc<FakeTransport>) -> ClientState {
    let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok")));
    let config = ClientConfig::default();
    let session = Arc::new(SessionManager::new(store, config.verify_mode));
    session.login(Credential::new("tok")).expect("login");
    ClientState::with_transport(config, session, transport)
}

pub fn transaction_json(id: i64, amount: f64) -> Value {
    serde_json::json!({
        "id": id,
        "user_id": 1,
        "amount": amount,
        "type": "expense",
        "category": "Other",
        "description": "Receipt upload",
        "date": "2025-06-01",
        "source": "manual",
        "created_at": "2025-06-01T10:00:00Z",
    })
}
