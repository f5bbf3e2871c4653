mod errors;
mod handlers;
mod middleware;
mod parse;
mod reports;
mod state;

use std::net::SocketAddr;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, patch, post},
};
use tokio::task::JoinHandle;

pub use errors::StubError;
pub use middleware::AuthUser;
pub use state::{RecordedRequest, StubState, generate_token};

pub fn router(state: StubState) -> Router<()> {
    let protected = Router::new()
        .route("/me", get(handlers::me))
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route(
            "/transactions/:id",
            patch(handlers::update_transaction).delete(handlers::delete_transaction),
        )
        .route("/transactions/upload/excel", post(handlers::upload_excel))
        .route("/ml/ocr", post(handlers::ocr))
        .route("/ml/classify", post(handlers::classify))
        .route("/ml/forecast", get(handlers::forecast))
        .route("/dashboard/summary", get(handlers::summary))
        .route("/dashboard/breakdown", get(handlers::breakdown))
        .route("/dashboard/cashflow", get(handlers::cashflow))
        .route(
            "/tax/settings",
            get(handlers::get_tax_settings).put(handlers::put_tax_settings),
        )
        .route("/tax/estimate", get(handlers::tax_estimate))
        .route("/chat", post(handlers::chat))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_bearer,
        ));

    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .merge(protected)
        .layer(DefaultBodyLimit::max(12 * 1024 * 1024))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::record_request,
        ))
        .with_state(state)
}

/// Serves the stub on `addr`. Port 0 picks a free port; the bound address
/// is returned with the server task.
pub async fn spawn(
    state: StubState,
    addr: SocketAddr,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let app = router(state);
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            eprintln!("stub backend stopped: {}", err);
        }
    });
    Ok((local, handle))
}

#[cfg(test)]
mod tests;
