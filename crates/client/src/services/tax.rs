use finsight_core::{TaxEstimate, TaxSettings};
use serde_json::{Value, json};

use crate::cache::{Query, QueryKey};
use crate::error::Result;
use crate::services::resources::{TAX_ESTIMATE, TAX_SETTINGS};
use crate::services::{read_fetcher, send_json};
use crate::transport::{ApiRequest, SharedTransport};

#[derive(Clone)]
pub struct TaxApi {
    transport: SharedTransport,
}

impl TaxApi {
    pub(super) fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    /// `None` until the user saves settings for the first time.
    pub fn settings_query(&self) -> Query<Option<TaxSettings>> {
        Query::new(
            QueryKey::new(TAX_SETTINGS),
            read_fetcher(self.transport.clone(), ApiRequest::get("/tax/settings"), Value::Null),
        )
    }

    pub async fn save_settings(&self, settings: &TaxSettings) -> Result<TaxSettings> {
        let request = ApiRequest::put("/tax/settings").with_json(settings)?;
        send_json(&self.transport, request).await
    }

    /// Estimate for `year`, or the current year when `None`.
    pub fn estimate_query(&self, year: Option<i32>) -> Query<TaxEstimate> {
        let mut key = QueryKey::new(TAX_ESTIMATE);
        let mut request = ApiRequest::get("/tax/estimate");
        if let Some(year) = year {
            key = key.with_param("year", year.to_string());
            request = request.with_query(vec![("year".to_string(), year.to_string())]);
        }
        let empty = json!({
            "taxable_income": 0.0,
            "tax_rate": 0.0,
            "estimated_tax": 0.0,
            "net_profit": 0.0,
        });
        Query::new(key, read_fetcher(self.transport.clone(), request, empty))
    }
}
