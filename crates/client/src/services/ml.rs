use finsight_core::{ClassifyRequest, ClassifyResponse, ForecastResponse, OcrExtraction};
use serde_json::json;

use crate::cache::{Query, QueryKey};
use crate::error::{ClientError, Result};
use crate::services::resources::FORECAST;
use crate::services::{read_fetcher, send_json};
use crate::transport::{ApiRequest, SharedTransport};
use crate::uploads::UploadFile;

#[derive(Clone)]
pub struct MlApi {
    transport: SharedTransport,
}

impl MlApi {
    pub(super) fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    pub fn forecast_query(&self) -> Query<ForecastResponse> {
        let empty = json!({"method": "", "forecast": [], "history_months": 0});
        Query::new(
            QueryKey::new(FORECAST),
            read_fetcher(self.transport.clone(), ApiRequest::get("/ml/forecast"), empty),
        )
    }

    pub async fn classify(&self, description: &str) -> Result<ClassifyResponse> {
        let description = description.trim();
        if description.is_empty() {
            return Err(ClientError::Validation("description is required".to_string()));
        }
        let request = ApiRequest::post("/ml/classify").with_json(&ClassifyRequest {
            description: description.to_string(),
        })?;
        send_json(&self.transport, request).await
    }

    /// Extraction only. Nothing is written on the backend.
    pub async fn ocr(&self, file: UploadFile) -> Result<OcrExtraction> {
        send_json(&self.transport, ApiRequest::post("/ml/ocr").with_file(file)).await
    }
}
