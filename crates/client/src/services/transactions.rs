use finsight_core::{
    Transaction, TransactionDraft, TransactionFilter, TransactionPage, TransactionPatch,
    UploadBatchResult,
};
use serde_json::json;

use crate::cache::{Query, QueryKey};
use crate::error::Result;
use crate::services::resources::TRANSACTIONS;
use crate::services::{read_fetcher, send_json};
use crate::transport::{ApiRequest, SharedTransport};
use crate::uploads::UploadFile;

#[derive(Clone)]
pub struct TransactionsApi {
    transport: SharedTransport,
}

impl TransactionsApi {
    pub(super) fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    fn list_request(filter: &TransactionFilter) -> ApiRequest {
        ApiRequest::get("/transactions").with_query(filter.query_pairs())
    }

    pub fn list_key(filter: &TransactionFilter) -> QueryKey {
        QueryKey::new(TRANSACTIONS).with_params(filter.query_pairs())
    }

    pub fn list_query(&self, filter: &TransactionFilter) -> Query<TransactionPage> {
        Query::new(
            Self::list_key(filter),
            read_fetcher(
                self.transport.clone(),
                Self::list_request(filter),
                empty_page(),
            ),
        )
    }

    pub async fn create(&self, draft: &TransactionDraft) -> Result<Transaction> {
        let request = ApiRequest::post("/transactions").with_json(draft)?;
        send_json(&self.transport, request).await
    }

    pub async fn update(&self, id: i64, patch: &TransactionPatch) -> Result<Transaction> {
        let request = ApiRequest::patch(format!("/transactions/{}", id)).with_json(patch)?;
        send_json(&self.transport, request).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.transport
            .send(ApiRequest::delete(format!("/transactions/{}", id)))
            .await?;
        Ok(())
    }

    pub async fn upload_excel(&self, file: UploadFile) -> Result<UploadBatchResult> {
        let request = ApiRequest::post("/transactions/upload/excel").with_file(file);
        send_json(&self.transport, request).await
    }
}

fn empty_page() -> serde_json::Value {
    json!({"data": [], "total": 0})
}
