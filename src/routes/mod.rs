pub mod api_routes;
pub mod space_routes;

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::service::chat_service::ChatService;
use crate::service::space_chat_service::SpaceChatService;
use crate::service::space_service::SpaceService;

use api_routes::*;
use space_routes::*;

#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub space_chat: SpaceChatService,
    pub spaces: SpaceService,
}

/// All JSON API routes. Middleware layers are added by the caller.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Demo chat
        .route("/api/pretrained-luts", get(list_pretrained_handler))
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/{id}", get(get_session_handler))
        .route("/api/sessions/{id}/lut", post(switch_lut_handler))
        .route("/api/sessions/{id}/lut/new", post(new_lut_handler))
        .route("/api/sessions/{id}/threshold", put(set_threshold_handler))
        .route("/api/sessions/{id}/blocks", post(add_block_handler))
        .route("/api/sessions/{id}/blocks/{block}", delete(delete_block_handler))
        .route("/api/sessions/{id}/blocks/{block}/toggle", post(toggle_block_handler))
        .route("/api/sessions/{id}/blocks/{block}/residual", put(set_residual_handler))
        .route("/api/sessions/{id}/messages", post(send_message_handler))
        .route("/api/sessions/{id}/teach", post(teach_handler))
        .route("/api/sessions/{id}/train-docs", post(train_docs_handler))
        // Spaces
        .route("/api/spaces", get(list_spaces_handler).post(create_space_handler))
        .route(
            "/api/spaces/{id}",
            get(get_space_handler).patch(update_space_handler).delete(delete_space_handler),
        )
        .route("/api/spaces/{id}/members", get(list_members_handler).post(invite_handler))
        .route("/api/spaces/{id}/accept", post(accept_handler))
        .route("/api/invitations", get(pending_invitations_handler))
        .route("/api/members/{id}", delete(remove_member_handler))
        // Space knowledge
        .route("/api/spaces/by-lut/{lut_name}", get(get_space_by_lut_handler))
        .route("/api/spaces/by-lut/{lut_name}/sessions", post(open_space_session_handler))
        .route("/api/spaces/by-lut/{lut_name}/qa", post(generate_qa_handler))
        .route("/api/spaces/by-lut/{lut_name}/train", post(train_pairs_handler))
        .route("/api/spaces/by-lut/{lut_name}/training-log", get(training_log_handler))
        .with_state(state)
}
