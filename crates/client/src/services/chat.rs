use finsight_core::{ChatReply, ChatRequest};

use crate::error::Result;
use crate::services::send_json;
use crate::transport::{ApiRequest, SharedTransport};

#[derive(Clone)]
pub struct ChatApi {
    transport: SharedTransport,
}

impl ChatApi {
    pub(super) fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    pub async fn send(&self, request: &ChatRequest) -> Result<ChatReply> {
        let request = ApiRequest::post("/chat").with_json(request)?;
        send_json(&self.transport, request).await
    }
}
