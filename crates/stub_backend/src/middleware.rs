use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use crate::{
    errors::StubError,
    state::{RecordedRequest, StubState},
};

/// User resolved from the bearer token, available to protected handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub i64);

fn bearer(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

pub async fn record_request(
    State(state): State<StubState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    state.record(RecordedRequest {
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
        bearer: bearer(&req),
    });
    next.run(req).await
}

pub async fn require_bearer(
    State(state): State<StubState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StubError> {
    let user_id = bearer(&req)
        .and_then(|token| state.user_for_token(&token))
        .ok_or_else(|| StubError::unauthorized("unauthorized"))?;
    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}
