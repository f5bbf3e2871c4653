use finsight_core::{
    CashFlowPoint, CategoryBreakdown, DashboardSummary, DateRange, Granularity, TransactionType,
};
use serde_json::{Value, json};

use crate::cache::{Query, QueryKey};
use crate::services::read_fetcher;
use crate::services::resources::{DASHBOARD_BREAKDOWN, DASHBOARD_CASHFLOW, DASHBOARD_SUMMARY};
use crate::transport::{ApiRequest, SharedTransport};

#[derive(Clone)]
pub struct DashboardApi {
    transport: SharedTransport,
}

impl DashboardApi {
    pub(super) fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    pub fn summary_query(&self, range: &DateRange) -> Query<DashboardSummary> {
        let params = range.query_pairs();
        self.query(DASHBOARD_SUMMARY, "/dashboard/summary", params, empty_summary())
    }

    /// Per-category totals. The backend reads a missing `type` as expenses.
    pub fn breakdown_query(
        &self,
        range: &DateRange,
        kind: Option<TransactionType>,
    ) -> Query<Vec<CategoryBreakdown>> {
        let mut params = range.query_pairs();
        if let Some(kind) = kind {
            params.push(("type".to_string(), kind.to_string()));
        }
        self.query(
            DASHBOARD_BREAKDOWN,
            "/dashboard/breakdown",
            params,
            Value::Array(Vec::new()),
        )
    }

    pub fn cashflow_query(
        &self,
        range: &DateRange,
        granularity: Granularity,
    ) -> Query<Vec<CashFlowPoint>> {
        let mut params = range.query_pairs();
        params.push(("granularity".to_string(), granularity.as_str().to_string()));
        self.query(
            DASHBOARD_CASHFLOW,
            "/dashboard/cashflow",
            params,
            Value::Array(Vec::new()),
        )
    }

    fn query<T: serde::de::DeserializeOwned>(
        &self,
        resource: &str,
        path: &str,
        params: Vec<(String, String)>,
        empty: Value,
    ) -> Query<T> {
        let key = QueryKey::new(resource).with_params(params.clone());
        let request = ApiRequest::get(path).with_query(params);
        Query::new(key, read_fetcher(self.transport.clone(), request, empty))
    }
}

fn empty_summary() -> Value {
    json!({"total_income": 0.0, "total_expenses": 0.0, "profit": 0.0, "period": ""})
}
