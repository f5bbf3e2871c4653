use finsight_core::{LoginRequest, RegisterRequest, TokenResponse, UserProfile};

use crate::error::{ClientError, Result};
use crate::services::send_json;
use crate::session::Credential;
use crate::transport::{ApiRequest, SharedTransport};

#[derive(Clone)]
pub struct AuthApi {
    transport: SharedTransport,
}

impl AuthApi {
    pub(super) fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<Credential> {
        let request = ApiRequest::post("/auth/login").with_json(request)?;
        let token: TokenResponse = send_json(&self.transport, request).await?;
        issued_credential(token)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Credential> {
        let request = ApiRequest::post("/auth/register").with_json(request)?;
        let token: TokenResponse = send_json(&self.transport, request).await?;
        issued_credential(token)
    }

    pub async fn me(&self) -> Result<UserProfile> {
        send_json(&self.transport, ApiRequest::get("/me")).await
    }
}

fn issued_credential(token: TokenResponse) -> Result<Credential> {
    Credential::parse(&token.access_token)
        .ok_or_else(|| ClientError::Decode("empty access_token in response".to_string()))
}
