use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::util::ServiceExt;

use crate::StubState;

const BOUNDARY: &str = "finsight-boundary";

fn app_with_user() -> (StubState, axum::Router) {
    let state = StubState::new();
    state.seed_user("owner@example.com", "secret");
    state.queue_token("tok1");
    let router = crate::router(state.clone());
    (state, router)
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

fn multipart_request(uri: &str, token: &str, file_name: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n{c}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = file_name,
        c = contents
    );
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body))
        .expect("request")
}

async fn login(router: &axum::Router) -> String {
    let (status, body) = send(
        router,
        json_request(
            "POST",
            "/auth/login",
            None,
            json!({"identifier": "owner@example.com", "password": "secret"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).expect("json");
    value["access_token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn protected_routes_require_bearer() {
    let (state, router) = app_with_user();

    let (status, body) = send(
        &router,
        Request::builder()
            .uri("/me")
            .body(Body::empty())
            .expect("request"),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.trim(), "unauthorized");
    assert_eq!(state.requests_to("GET", "/me")[0].bearer, None);
}

#[tokio::test]
async fn login_token_opens_me() {
    let (state, router) = app_with_user();
    let token = login(&router).await;
    assert_eq!(token, "tok1");

    let request = Request::builder()
        .uri("/me")
        .header(header::AUTHORIZATION, "Bearer tok1")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("owner@example.com"));
    assert_eq!(
        state.requests_to("GET", "/me")[0].bearer.as_deref(),
        Some("tok1")
    );
}

#[tokio::test]
async fn create_rejects_non_positive_amount_as_plain_text() {
    let (_state, router) = app_with_user();
    let token = login(&router).await;

    let (status, body) = send(
        &router,
        json_request(
            "POST",
            "/transactions",
            Some(&token),
            json!({"amount": 0.0, "type": "expense", "description": "x", "date": "2025-01-02"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.trim(), "amount must be positive");
}

#[tokio::test]
async fn empty_list_is_an_empty_page() {
    let (_state, router) = app_with_user();
    let token = login(&router).await;

    let request = Request::builder()
        .uri("/transactions?page=1&page_size=20")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(value, json!({"data": [], "total": 0}));
}

#[tokio::test]
async fn excel_upload_imports_rows() {
    let (state, router) = app_with_user();
    let token = login(&router).await;
    let sheet = "date,amount,description\n2025-01-02,100,Invoice\n2025-01-03,-20,Coffee\n";

    let (status, body) = send(
        &router,
        multipart_request("/transactions/upload/excel", &token, "sheet.xlsx", sheet),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let value: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(value["imported"], 2);
    assert_eq!(value["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(state.transaction_count(1), 2);
}

#[tokio::test]
async fn ocr_never_creates_transactions() {
    let (state, router) = app_with_user();
    let token = login(&router).await;

    let (status, body) = send(
        &router,
        multipart_request("/ml/ocr", &token, "receipt.png", "Shop\nTotal: 9.99"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(value["draft_transaction"]["amount"], 9.99);
    assert_eq!(state.transaction_count(1), 0);
}

#[tokio::test]
async fn ml_errors_use_detail_shape() {
    let (_state, router) = app_with_user();
    let token = login(&router).await;

    let (status, body) = send(
        &router,
        json_request("POST", "/ml/classify", Some(&token), json!({"description": " "})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let value: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(value["detail"], "description is required");
}
