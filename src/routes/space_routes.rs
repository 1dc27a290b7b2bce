use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::errors::AppError;
use crate::models::{
    AcceptInvitationRequest, CreateSpaceRequest, EmailQuery, GenerateQaRequest, InviteRequest,
    SessionView, Space, SpaceMember, TrainPairsRequest, TrainingLogEntry, TrainingSummary,
    UpdateSpaceRequest, UserQuery,
};
use crate::qa::QaPair;
use crate::routes::AppState;

type ApiResult<T> = Result<Json<T>, AppError>;

// ── Spaces ────────────────────────────────────────────────────────────────────

/// GET `/api/spaces?user_id=..&email=..`
pub async fn list_spaces_handler(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Vec<Space>> {
    state.spaces.get_user_spaces(&query.user_id, &query.email).await.map(Json)
}

/// POST `/api/spaces`
pub async fn create_space_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateSpaceRequest>,
) -> Result<(StatusCode, Json<Space>), AppError> {
    let space = state.spaces.create_space(body).await?;
    Ok((StatusCode::CREATED, Json(space)))
}

/// GET `/api/spaces/{id}`
pub async fn get_space_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Space> {
    state
        .spaces
        .get_space(&id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("Space", &id))
}

/// GET `/api/spaces/by-lut/{lut_name}`
pub async fn get_space_by_lut_handler(
    Path(lut_name): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Space> {
    require_space(&state, &lut_name).await.map(Json)
}

/// PATCH `/api/spaces/{id}`
pub async fn update_space_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<UpdateSpaceRequest>,
) -> ApiResult<Space> {
    state.spaces.update_space(&id, body).await.map(Json)
}

/// DELETE `/api/spaces/{id}`
pub async fn delete_space_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    state.spaces.delete_space(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Membership ────────────────────────────────────────────────────────────────

/// GET `/api/spaces/{id}/members`
pub async fn list_members_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Vec<SpaceMember>> {
    state.spaces.get_space_members(&id).await.map(Json)
}

/// POST `/api/spaces/{id}/members`
pub async fn invite_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<InviteRequest>,
) -> Result<(StatusCode, Json<SpaceMember>), AppError> {
    let member = state.spaces.invite(&id, &body.email, &body.invited_by).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

/// POST `/api/spaces/{id}/accept`
pub async fn accept_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<AcceptInvitationRequest>,
) -> Result<StatusCode, AppError> {
    state.spaces.accept_invitation(&id, &body.user_id, &body.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/api/invitations?email=..`
pub async fn pending_invitations_handler(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Json<Vec<SpaceMember>> {
    Json(state.spaces.get_pending_invitations(&query.email).await)
}

/// DELETE `/api/members/{id}`
pub async fn remove_member_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    state.spaces.remove_member(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Space knowledge ───────────────────────────────────────────────────────────

/// POST `/api/spaces/by-lut/{lut_name}/sessions`
pub async fn open_space_session_handler(
    Path(lut_name): Path<String>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    require_space(&state, &lut_name).await?;
    let session = state.space_chat.open_session(&lut_name)?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST `/api/spaces/by-lut/{lut_name}/qa`: derives Q&A pairs for review.
pub async fn generate_qa_handler(
    Path(lut_name): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<GenerateQaRequest>,
) -> ApiResult<Vec<QaPair>> {
    require_space(&state, &lut_name).await?;
    state.space_chat.generate_qa_pairs(&lut_name, &body.text).await.map(Json)
}

/// POST `/api/spaces/by-lut/{lut_name}/train`
pub async fn train_pairs_handler(
    Path(lut_name): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<TrainPairsRequest>,
) -> ApiResult<TrainingSummary> {
    require_space(&state, &lut_name).await?;
    state
        .space_chat
        .train_pairs(&lut_name, &body.user, &body.pairs)
        .await
        .map(Json)
}

/// GET `/api/spaces/by-lut/{lut_name}/training-log`
pub async fn training_log_handler(
    Path(lut_name): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Vec<TrainingLogEntry>> {
    state.space_chat.training_log(&lut_name).map(Json)
}

// ── Helper ────────────────────────────────────────────────────────────────────

async fn require_space(state: &AppState, lut_name: &str) -> Result<Space, AppError> {
    state
        .spaces
        .get_space_by_lut_name(lut_name)
        .await?
        .ok_or_else(|| not_found("Space", lut_name))
}

fn not_found(entity_type: &str, id: &str) -> AppError {
    AppError::RecordNotFound { entity_type: entity_type.to_string(), id: id.to_string() }
}
