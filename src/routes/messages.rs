use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::{
        messages::{MessageList, SendMessageRequest},
        users::UserList,
    },
    error::AppResult,
    extract::{AppJson, AppPath},
    middleware::auth::AuthUser,
    models::Message,
    response::ApiResponse,
    services::message_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(chat_users))
        .route("/{id}", get(conversation).post(send_message))
}

#[utoipa::path(
    get,
    path = "/api/messages/users",
    responses(
        (status = 200, description = "Users sharing the caller's role", body = ApiResponse<UserList>),
        (status = 403, description = "Admin only")
    ),
    tag = "Messages"
)]
pub async fn chat_users(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<UserList>>> {
    let resp = message_service::chat_users(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/messages/{id}",
    params(
        ("id" = Uuid, Path, description = "Other participant's user ID")
    ),
    responses(
        (status = 200, description = "Conversation, oldest first", body = ApiResponse<MessageList>)
    ),
    tag = "Messages"
)]
pub async fn conversation(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<MessageList>>> {
    let resp = message_service::conversation(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/messages/{id}",
    params(
        ("id" = Uuid, Path, description = "Receiver's user ID")
    ),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored and pushed", body = ApiResponse<Message>),
        (status = 400, description = "Neither text nor image given"),
        (status = 404, description = "Receiver not found")
    ),
    tag = "Messages"
)]
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Message>>)> {
    let resp = message_service::send_message(&state, &user, id, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}
