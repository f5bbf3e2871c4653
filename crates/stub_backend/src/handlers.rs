use axum::{
    Extension,
    extract::{Json, Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use finsight_core::{
    ChatReply, ChatRequest, ClassifyRequest, Granularity, LoginRequest, RegisterRequest,
    TaxSettings, TokenResponse, TransactionDraft, TransactionFilter, TransactionPage,
    TransactionPatch, TransactionSource, TransactionType, UploadBatchResult,
};

use crate::{errors::StubError, middleware::AuthUser, parse, reports, state::StubState};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
    #[serde(rename = "type")]
    kind: Option<TransactionType>,
    granularity: Option<Granularity>,
}

impl RangeQuery {
    fn window(&self) -> reports::Window {
        reports::Window::new(self.from.as_deref(), self.to.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EstimateQuery {
    year: Option<i32>,
}

pub async fn register(
    State(state): State<StubState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StubError> {
    let access_token = state.register(req)?;
    Ok((StatusCode::CREATED, Json(TokenResponse { access_token })))
}

pub async fn login(
    State(state): State<StubState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StubError> {
    let access_token = state.login(&req.identifier, &req.password)?;
    Ok(Json(TokenResponse { access_token }))
}

pub async fn me(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, StubError> {
    Ok(Json(state.profile(user_id)?))
}

pub async fn list_transactions(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(filter): Query<TransactionFilter>,
) -> impl IntoResponse {
    let (data, total) = state.list(user_id, &filter);
    Json(TransactionPage { data, total })
}

pub async fn create_transaction(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(draft): Json<TransactionDraft>,
) -> Result<impl IntoResponse, StubError> {
    let created = state.create(user_id, draft, TransactionSource::Manual)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_transaction(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(patch): Json<TransactionPatch>,
) -> Result<impl IntoResponse, StubError> {
    Ok(Json(state.update(user_id, id, patch)?))
}

pub async fn delete_transaction(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> StatusCode {
    state.delete(user_id, id);
    StatusCode::NO_CONTENT
}

async fn read_file(multipart: &mut Multipart) -> Result<Vec<u8>, StubError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| StubError::bad_request(err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|err| StubError::bad_request(err.to_string()))?;
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(StubError::bad_request("file too large (max 10MB)"));
        }
        return Ok(bytes.to_vec());
    }
    Err(StubError::bad_request("file field required"))
}

pub async fn upload_excel(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, StubError> {
    let bytes = read_file(&mut multipart).await?;
    let rows = parse::parse_sheet(&bytes)?;
    let items = state.import(user_id, rows);
    Ok((
        StatusCode::CREATED,
        Json(UploadBatchResult {
            imported_count: items.len() as u64,
            items,
        }),
    ))
}

pub async fn ocr(mut multipart: Multipart) -> Result<impl IntoResponse, StubError> {
    let bytes = read_file(&mut multipart)
        .await
        .map_err(|err| StubError::ml(err.status(), "file field required"))?;
    Ok(Json(parse::extract_receipt(&bytes)))
}

pub async fn classify(Json(req): Json<ClassifyRequest>) -> Result<impl IntoResponse, StubError> {
    if req.description.trim().is_empty() {
        return Err(StubError::ml(
            StatusCode::UNPROCESSABLE_ENTITY,
            "description is required",
        ));
    }
    Ok(Json(reports::classify(&req.description)))
}

pub async fn forecast(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> impl IntoResponse {
    Json(reports::forecast(&state.transactions_for(user_id)))
}

pub async fn summary(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<RangeQuery>,
) -> impl IntoResponse {
    Json(reports::summary(
        &state.transactions_for(user_id),
        &query.window(),
    ))
}

pub async fn breakdown(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<RangeQuery>,
) -> impl IntoResponse {
    Json(reports::breakdown(
        &state.transactions_for(user_id),
        &query.window(),
        query.kind.unwrap_or(TransactionType::Expense),
    ))
}

pub async fn cashflow(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<RangeQuery>,
) -> impl IntoResponse {
    Json(reports::cashflow(
        &state.transactions_for(user_id),
        &query.window(),
        query.granularity.unwrap_or_default(),
    ))
}

pub async fn get_tax_settings(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> impl IntoResponse {
    Json(
        state
            .tax_settings(user_id)
            .unwrap_or_else(reports::default_tax_settings),
    )
}

pub async fn put_tax_settings(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(settings): Json<TaxSettings>,
) -> impl IntoResponse {
    let settings = reports::sanitize_tax_settings(settings);
    Json(state.save_tax_settings(user_id, settings))
}

pub async fn tax_estimate(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<EstimateQuery>,
) -> impl IntoResponse {
    let settings = state
        .tax_settings(user_id)
        .unwrap_or_else(reports::default_tax_settings);
    let year = query
        .year
        .filter(|year| *year != 0)
        .unwrap_or_else(reports::current_year);
    Json(reports::tax_estimate(
        &state.transactions_for(user_id),
        &settings,
        year,
    ))
}

pub async fn chat(
    State(state): State<StubState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, StubError> {
    if req.message.trim().is_empty() {
        return Err(StubError::ml(StatusCode::BAD_REQUEST, "message is required"));
    }
    let reply = reports::chat_reply(&req.message, &state.transactions_for(user_id));
    Ok(Json(ChatReply { reply }))
}
