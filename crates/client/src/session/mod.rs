mod store;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::transport::{ApiRequest, CredentialSource, SharedTransport};

pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

/// Opaque bearer token. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Reads a stored token; blank contents mean no credential.
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim();
        if token.is_empty() {
            None
        } else {
            Some(Self(token.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub authenticated: bool,
    pub verified: bool,
}

impl SessionState {
    pub const SIGNED_OUT: SessionState = SessionState {
        authenticated: false,
        verified: false,
    };
    pub const OPTIMISTIC: SessionState = SessionState {
        authenticated: true,
        verified: false,
    };
    pub const VERIFIED: SessionState = SessionState {
        authenticated: true,
        verified: true,
    };
}

/// How `bootstrap` treats a stored credential before the backend vouches for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// Publish `{true, false}` at once and verify in the background.
    #[default]
    Optimistic,
    /// Stay signed out until verification resolves.
    Blocking,
}

/// Result of [`SessionManager::bootstrap`].
#[derive(Debug)]
pub enum Bootstrap {
    /// No stored credential. Nothing was sent.
    SignedOut,
    /// Optimistic state is published; the handle resolves with the verified state.
    Verifying(JoinHandle<SessionState>),
    /// Verification already resolved, or the session was bootstrapped before.
    Settled(SessionState),
}

impl Bootstrap {
    pub async fn settled(self) -> SessionState {
        match self {
            Bootstrap::SignedOut => SessionState::SIGNED_OUT,
            Bootstrap::Settled(state) => state,
            Bootstrap::Verifying(handle) => handle.await.unwrap_or_else(|err| {
                warn!("session verification task failed: {}", err);
                SessionState::SIGNED_OUT
            }),
        }
    }
}

#[derive(Debug, Default)]
struct SessionInner {
    credential: Option<Credential>,
    /// Bumped on every credential change so late verification results can be dropped.
    epoch: u64,
    bootstrapped: bool,
}

/// Sole owner of the credential and the derived session state.
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    mode: VerifyMode,
    inner: Mutex<SessionInner>,
    state: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, mode: VerifyMode) -> Self {
        let (state, _) = watch::channel(SessionState::SIGNED_OUT);
        Self {
            store,
            mode,
            inner: Mutex::new(SessionInner::default()),
            state,
        }
    }

    pub fn mode(&self) -> VerifyMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receives every published transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Seeds the session from the stored credential and issues the single
    /// `GET /me` verification for this bootstrap.
    pub async fn bootstrap(self: &Arc<Self>, transport: SharedTransport) -> Bootstrap {
        let epoch = {
            let mut inner = self.lock();
            if inner.bootstrapped {
                return Bootstrap::Settled(self.state());
            }
            inner.bootstrapped = true;
            let stored = self.store.load().unwrap_or_else(|err| {
                warn!("failed to read stored credential: {}", err);
                None
            });
            let Some(credential) = stored else {
                inner.credential = None;
                self.publish(SessionState::SIGNED_OUT);
                return Bootstrap::SignedOut;
            };
            inner.credential = Some(credential);
            inner.epoch += 1;
            if self.mode == VerifyMode::Optimistic {
                self.publish(SessionState::OPTIMISTIC);
            }
            inner.epoch
        };

        let verification = Arc::clone(self).verify(transport, epoch);
        match self.mode {
            VerifyMode::Optimistic => Bootstrap::Verifying(tokio::spawn(verification)),
            VerifyMode::Blocking => Bootstrap::Settled(verification.await),
        }
    }

    async fn verify(self: Arc<Self>, transport: SharedTransport, epoch: u64) -> SessionState {
        match transport.send(ApiRequest::get("/me")).await {
            Ok(_) => self.settle_verification(epoch, true),
            Err(err) => {
                warn!("credential verification failed: {}", err);
                self.settle_verification(epoch, false)
            }
        }
    }

    pub fn on_verify_success(&self) -> SessionState {
        let epoch = self.lock().epoch;
        self.settle_verification(epoch, true)
    }

    pub fn on_verify_failure(&self) -> SessionState {
        let epoch = self.lock().epoch;
        self.settle_verification(epoch, false)
    }

    fn settle_verification(&self, epoch: u64, accepted: bool) -> SessionState {
        let mut inner = self.lock();
        if inner.epoch != epoch || inner.credential.is_none() {
            info!("ignoring verification result for a replaced credential");
            return self.state();
        }
        if accepted {
            self.publish(SessionState::VERIFIED);
            return SessionState::VERIFIED;
        }
        if let Err(err) = self.store.clear() {
            warn!("failed to purge rejected credential: {}", err);
        }
        inner.credential = None;
        inner.epoch += 1;
        self.publish(SessionState::SIGNED_OUT);
        SessionState::SIGNED_OUT
    }

    /// Persists a credential the backend just issued. The session is verified
    /// immediately since the server vouched for it synchronously.
    pub fn login(&self, credential: Credential) -> Result<SessionState> {
        let mut inner = self.lock();
        self.store.save(&credential)?;
        inner.credential = Some(credential);
        inner.epoch += 1;
        inner.bootstrapped = true;
        self.publish(SessionState::VERIFIED);
        Ok(SessionState::VERIFIED)
    }

    pub fn register(&self, credential: Credential) -> Result<SessionState> {
        self.login(credential)
    }

    pub fn logout(&self) -> SessionState {
        let mut inner = self.lock();
        if let Err(err) = self.store.clear() {
            warn!("failed to remove stored credential: {}", err);
        }
        inner.credential = None;
        inner.epoch += 1;
        inner.bootstrapped = false;
        self.publish(SessionState::SIGNED_OUT);
        SessionState::SIGNED_OUT
    }

    fn publish(&self, next: SessionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(
                "session state: authenticated={} verified={}",
                next.authenticated, next.verified
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl CredentialSource for SessionManager {
    fn credential(&self) -> Option<Credential> {
        self.lock().credential.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::ClientError;
    use crate::transport::{ApiResponse, Transport};

    struct MeEndpoint {
        accept: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl MeEndpoint {
        fn new(accept: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                accept,
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for MeEndpoint {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
            assert_eq!(request.path, "/me");
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.accept {
                Ok(ApiResponse {
                    status: 200,
                    body: serde_json::json!({"id": 1}),
                })
            } else {
                Err(ClientError::Auth("invalid token".to_string()))
            }
        }
    }

    fn manager(store: Arc<MemoryCredentialStore>, mode: VerifyMode) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(store, mode))
    }

    #[tokio::test]
    async fn no_credential_means_no_network() {
        let endpoint = MeEndpoint::new(true, Duration::ZERO);
        let session = manager(Arc::new(MemoryCredentialStore::new()), VerifyMode::Optimistic);

        let outcome = session.bootstrap(endpoint.clone()).await;

        assert!(matches!(outcome, Bootstrap::SignedOut));
        assert_eq!(session.state(), SessionState::SIGNED_OUT);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stored_credential_is_optimistic_before_verification() {
        let endpoint = MeEndpoint::new(true, Duration::from_secs(5));
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok")));
        let session = manager(store, VerifyMode::Optimistic);

        let outcome = session.bootstrap(endpoint.clone()).await;
        assert_eq!(session.state(), SessionState::OPTIMISTIC);

        assert_eq!(outcome.settled().await, SessionState::VERIFIED);
        assert_eq!(session.state(), SessionState::VERIFIED);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_credential_is_purged() {
        let endpoint = MeEndpoint::new(false, Duration::ZERO);
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("old")));
        let session = manager(store.clone(), VerifyMode::Optimistic);
        let mut updates = session.subscribe();

        let state = session.bootstrap(endpoint.clone()).await.settled().await;

        assert_eq!(state, SessionState::SIGNED_OUT);
        assert_eq!(store.current(), None);
        assert_eq!(session.credential(), None);
        assert_eq!(*updates.borrow_and_update(), SessionState::SIGNED_OUT);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blocking_mode_waits_for_verification() {
        let endpoint = MeEndpoint::new(true, Duration::ZERO);
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok")));
        let session = manager(store, VerifyMode::Blocking);
        let updates = session.subscribe();

        let outcome = session.bootstrap(endpoint).await;

        assert!(matches!(outcome, Bootstrap::Settled(SessionState::VERIFIED)));
        assert_eq!(*updates.borrow(), SessionState::VERIFIED);
    }

    #[tokio::test]
    async fn second_bootstrap_does_not_verify_again() {
        let endpoint = MeEndpoint::new(true, Duration::ZERO);
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok")));
        let session = manager(store, VerifyMode::Optimistic);

        session.bootstrap(endpoint.clone()).await.settled().await;
        let again = session.bootstrap(endpoint.clone()).await;

        assert!(matches!(again, Bootstrap::Settled(SessionState::VERIFIED)));
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_failure_does_not_revoke_newer_login() {
        let endpoint = MeEndpoint::new(false, Duration::from_secs(5));
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("old")));
        let session = manager(store.clone(), VerifyMode::Optimistic);

        let outcome = session.bootstrap(endpoint).await;
        session.logout();
        session.login(Credential::new("new")).expect("login");

        outcome.settled().await;
        assert_eq!(session.state(), SessionState::VERIFIED);
        assert_eq!(store.current(), Some(Credential::new("new")));
    }

    #[tokio::test(start_paused = true)]
    async fn verify_success_confirms_optimistic_session() {
        let endpoint = MeEndpoint::new(true, Duration::from_secs(60));
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok")));
        let session = manager(store.clone(), VerifyMode::Optimistic);
        let _pending = session.bootstrap(endpoint).await;
        assert_eq!(session.state(), SessionState::OPTIMISTIC);

        let state = session.on_verify_success();

        assert_eq!(
            state,
            SessionState {
                authenticated: true,
                verified: true
            }
        );
        assert_eq!(session.state(), SessionState::VERIFIED);
        assert_eq!(store.current(), Some(Credential::new("tok")));
    }

    #[tokio::test(start_paused = true)]
    async fn verify_failure_signs_out_and_purges() {
        let endpoint = MeEndpoint::new(true, Duration::from_secs(5));
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok")));
        let session = manager(store.clone(), VerifyMode::Optimistic);
        let outcome = session.bootstrap(endpoint).await;
        assert_eq!(session.state(), SessionState::OPTIMISTIC);

        let state = session.on_verify_failure();

        assert_eq!(
            state,
            SessionState {
                authenticated: false,
                verified: false
            }
        );
        assert_eq!(store.current(), None);
        assert_eq!(session.credential(), None);
        // The slower `/me` answer belongs to the purged credential.
        assert_eq!(outcome.settled().await, SessionState::SIGNED_OUT);
        assert_eq!(session.on_verify_success(), SessionState::SIGNED_OUT);
    }

    #[test]
    fn login_and_logout_transition_directly() {
        let store = Arc::new(MemoryCredentialStore::new());
        let session = SessionManager::new(store.clone(), VerifyMode::Optimistic);

        assert_eq!(
            session.login(Credential::new("tok1")).expect("login"),
            SessionState::VERIFIED
        );
        assert_eq!(session.credential(), Some(Credential::new("tok1")));

        assert_eq!(session.logout(), SessionState::SIGNED_OUT);
        assert_eq!(store.current(), None);
        assert_eq!(session.logout(), SessionState::SIGNED_OUT);
    }

    #[test]
    fn credential_debug_is_redacted() {
        assert_eq!(format!("{:?}", Credential::new("secret")), "Credential(***)");
        assert_eq!(Credential::parse("  tok \n"), Some(Credential::new("tok")));
    }
}
