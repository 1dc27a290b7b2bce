use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::errors::AppError;
use crate::lut::PretrainedLut;
use crate::models::{
    BlockRequest, ChatResponse, CreateSessionRequest, SendMessageRequest, SessionView,
    SwitchLutRequest, TeachRequest, TrainingSummary, ValueRequest,
};
use crate::routes::AppState;

type ApiResult<T> = Result<Json<T>, AppError>;

/// GET `/api/pretrained-luts`
pub async fn list_pretrained_handler(State(state): State<AppState>) -> Json<Vec<PretrainedLut>> {
    Json(state.chat.pretrained().to_vec())
}

/// POST `/api/sessions`: opens a demo chat on the named LUT, or the first
/// pre-trained one when no name is given.
pub async fn create_session_handler(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let session = state.chat.create_session(request.lut_name.as_deref())?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET `/api/sessions/{id}`
pub async fn get_session_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<SessionView> {
    state.chat.get_session(&id).map(Json)
}

/// POST `/api/sessions/{id}/lut`
pub async fn switch_lut_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<SwitchLutRequest>,
) -> ApiResult<SessionView> {
    state.chat.switch_lut(&id, &body.lut_name).map(Json)
}

/// POST `/api/sessions/{id}/lut/new`
pub async fn new_lut_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<SessionView> {
    state.chat.new_lut(&id).map(Json)
}

/// PUT `/api/sessions/{id}/threshold`
pub async fn set_threshold_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<ValueRequest>,
) -> ApiResult<SessionView> {
    state.chat.set_threshold(&id, body.value).map(Json)
}

/// POST `/api/sessions/{id}/blocks`
pub async fn add_block_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<BlockRequest>,
) -> ApiResult<SessionView> {
    state.chat.add_block(&id, body.block).map(Json)
}

/// DELETE `/api/sessions/{id}/blocks/{block}`
pub async fn delete_block_handler(
    Path((id, block)): Path<(String, i32)>,
    State(state): State<AppState>,
) -> ApiResult<SessionView> {
    state.chat.delete_block(&id, block).map(Json)
}

/// POST `/api/sessions/{id}/blocks/{block}/toggle`
pub async fn toggle_block_handler(
    Path((id, block)): Path<(String, i32)>,
    State(state): State<AppState>,
) -> ApiResult<SessionView> {
    state.chat.toggle_block(&id, block).map(Json)
}

/// PUT `/api/sessions/{id}/blocks/{block}/residual`
pub async fn set_residual_handler(
    Path((id, block)): Path<(String, i32)>,
    State(state): State<AppState>,
    Json(body): Json<ValueRequest>,
) -> ApiResult<SessionView> {
    state.chat.set_residual(&id, block, body.value).map(Json)
}

/// POST `/api/sessions/{id}/messages`: one chat turn against the inference server.
pub async fn send_message_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<SendMessageRequest>,
) -> ApiResult<ChatResponse> {
    state.chat.send_message(&id, &body.message).await.map(Json)
}

/// POST `/api/sessions/{id}/teach`
pub async fn teach_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<TeachRequest>,
) -> ApiResult<TrainingSummary> {
    state.chat.teach(&id, &body.question, &body.answer).await.map(Json)
}

/// POST `/api/sessions/{id}/train-docs`
pub async fn train_docs_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<TrainingSummary> {
    state.chat.train_example_docs(&id).await.map(Json)
}
