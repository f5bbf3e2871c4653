mod auth;
mod chat;
mod dashboard;
mod ml;
mod tax;
mod transactions;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::{Fetcher, fetcher};
use crate::error::Result;
use crate::transport::{ApiRequest, SharedTransport};

pub use auth::AuthApi;
pub use chat::ChatApi;
pub use dashboard::DashboardApi;
pub use ml::MlApi;
pub use tax::TaxApi;
pub use transactions::TransactionsApi;

/// Cache resource names. Invalidation patterns match against these.
pub mod resources {
    pub const TRANSACTIONS: &str = "transactions";
    pub const DASHBOARD_SUMMARY: &str = "dashboard-summary";
    pub const DASHBOARD_BREAKDOWN: &str = "dashboard-breakdown";
    pub const DASHBOARD_CASHFLOW: &str = "dashboard-cashflow";
    pub const FORECAST: &str = "forecast";
    pub const TAX_SETTINGS: &str = "tax-settings";
    pub const TAX_ESTIMATE: &str = "tax-estimate";
}

/// Typed endpoint registry, one service per backend area.
#[derive(Clone)]
pub struct ApiServices {
    pub auth: AuthApi,
    pub transactions: TransactionsApi,
    pub dashboard: DashboardApi,
    pub ml: MlApi,
    pub tax: TaxApi,
    pub chat: ChatApi,
}

impl ApiServices {
    pub fn new(transport: SharedTransport) -> Self {
        Self {
            auth: AuthApi::new(transport.clone()),
            transactions: TransactionsApi::new(transport.clone()),
            dashboard: DashboardApi::new(transport.clone()),
            ml: MlApi::new(transport.clone()),
            tax: TaxApi::new(transport.clone()),
            chat: ChatApi::new(transport),
        }
    }
}

async fn send_json<T: DeserializeOwned>(
    transport: &SharedTransport,
    request: ApiRequest,
) -> Result<T> {
    transport.send(request).await?.decode()
}

/// Fetcher for a read endpoint. A 404 or a `null` body reads as `empty`
/// so views render an empty state instead of an error.
fn read_fetcher(transport: SharedTransport, request: ApiRequest, empty: Value) -> Fetcher {
    fetcher(move || {
        let transport = transport.clone();
        let request = request.clone();
        let empty = empty.clone();
        async move { read_or_empty(&transport, request, empty).await }
    })
}

async fn read_or_empty(
    transport: &SharedTransport,
    request: ApiRequest,
    empty: Value,
) -> Result<Value> {
    match transport.send(request).await {
        Ok(response) if response.body.is_null() => Ok(empty),
        Ok(response) => Ok(response.body),
        Err(err) if err.is_not_found() => Ok(empty),
        Err(err) => Err(err),
    }
}
