use std::sync::Arc;

use finsight_core::{LoginRequest, RegisterRequest};
use log::warn;

use crate::cache::QueryCache;
use crate::chat::ChatSession;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::mutations::MutationCoordinator;
use crate::services::ApiServices;
use crate::session::{
    Bootstrap, CredentialStore, FileCredentialStore, SessionManager, SessionState,
};
use crate::startup::{ClientPaths, ensure_data_dir};
use crate::transport::{HttpTransport, SharedTransport};
use crate::uploads::{BulkImport, ReceiptScan};

/// Everything one client process shares: session, cache and the services
/// built on them. Front ends hold one; tests build as many as they need.
#[derive(Clone)]
pub struct ClientState {
    pub config: ClientConfig,
    pub session: Arc<SessionManager>,
    pub transport: SharedTransport,
    pub cache: QueryCache,
    pub api: ApiServices,
    pub mutations: MutationCoordinator,
}

impl ClientState {
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let session = Arc::new(SessionManager::new(store, config.verify_mode));
        let transport: SharedTransport = Arc::new(HttpTransport::new(&config, session.clone())?);
        Ok(Self::with_transport(config, session, transport))
    }

    /// State backed by the credential file under `paths`.
    pub fn open(config: ClientConfig, paths: &ClientPaths) -> Result<Self> {
        ensure_data_dir(paths)?;
        let store = FileCredentialStore::new(paths.credential_path.clone());
        Self::new(config, Arc::new(store))
    }

    pub fn with_transport(
        config: ClientConfig,
        session: Arc<SessionManager>,
        transport: SharedTransport,
    ) -> Self {
        let cache = QueryCache::new(config.cache_config());
        let api = ApiServices::new(transport.clone());
        let mutations = MutationCoordinator::new(api.clone(), cache.clone());
        Self {
            config,
            session,
            transport,
            cache,
            api,
            mutations,
        }
    }

    pub async fn bootstrap(&self) -> Bootstrap {
        self.session.bootstrap(self.transport.clone()).await
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Fails with `Auth` unless a credential is held.
    pub fn require_session(&self) -> Result<()> {
        if self.session.state().authenticated {
            Ok(())
        } else {
            Err(ClientError::Auth("please log in first".to_string()))
        }
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Result<SessionState> {
        let request = LoginRequest {
            identifier: identifier.trim().to_string(),
            password: password.to_string(),
        };
        let credential = self.api.auth.login(&request).await?;
        self.cache.clear();
        self.session.login(credential)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<SessionState> {
        let credential = self.api.auth.register(request).await?;
        self.cache.clear();
        self.session.register(credential)
    }

    /// Purges the credential and every cached entry. Never fails.
    pub fn logout(&self) -> SessionState {
        self.cache.clear();
        self.session.logout()
    }

    /// Passes `result` through, logging out first when it is an auth failure.
    pub fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result
            && err.is_auth()
            && self.session.state().authenticated
        {
            warn!("credential rejected, signing out: {}", err);
            self.logout();
        }
        result
    }

    pub fn bulk_import(&self) -> BulkImport {
        BulkImport::new(self.api.transactions.clone(), self.mutations.clone())
    }

    pub fn receipt_scan(&self) -> ReceiptScan {
        ReceiptScan::new(self.api.ml.clone(), self.mutations.clone())
    }

    pub fn chat(&self) -> ChatSession {
        ChatSession::new(self.api.chat.clone())
    }
}
