use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        messages::{MessageList, SendMessageRequest},
        users::UserList,
    },
    entity::{
        Roles,
        messages::{ActiveModel as MessageActive, Column as MessageCol, Entity as Messages},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Message, User},
    presence::ServerEvent,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Users sharing the caller's role, excluding the caller.
pub async fn chat_users(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let me = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = Users::find()
        .filter(
            Condition::all()
                .add(UserCol::RoleId.eq(me.role_id))
                .add(UserCol::Id.ne(me.id)),
        )
        .order_by_asc(UserCol::Name)
        .find_also_related(Roles)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|(u, role)| User::from_entity(u, role.as_ref()))
        .collect();

    Ok(ApiResponse::success("Chat users", UserList { items }, Some(Meta::empty())))
}

pub async fn conversation(
    state: &AppState,
    user: &AuthUser,
    other: Uuid,
) -> AppResult<ApiResponse<MessageList>> {
    ensure_admin(user)?;
    let items = Messages::find()
        .filter(
            Condition::any()
                .add(
                    Condition::all()
                        .add(MessageCol::SenderId.eq(user.user_id))
                        .add(MessageCol::ReceiverId.eq(other)),
                )
                .add(
                    Condition::all()
                        .add(MessageCol::SenderId.eq(other))
                        .add(MessageCol::ReceiverId.eq(user.user_id)),
                ),
        )
        .order_by_asc(MessageCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Message::from)
        .collect();

    Ok(ApiResponse::success("Messages", MessageList { items }, Some(Meta::empty())))
}

pub async fn send_message(
    state: &AppState,
    user: &AuthUser,
    receiver_id: Uuid,
    payload: SendMessageRequest,
) -> AppResult<ApiResponse<Message>> {
    ensure_admin(user)?;
    let (text, image) = payload.normalized();
    if text.is_empty() && image.is_empty() {
        return Err(AppError::BadRequest(
            "A message needs text or an image".into(),
        ));
    }

    Users::find_by_id(receiver_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let stored = MessageActive {
        id: Set(Uuid::new_v4()),
        sender_id: Set(user.user_id),
        receiver_id: Set(receiver_id),
        text: Set(text),
        image: Set(image),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let message = Message::from(stored);

    audit::record(
        &state.pool,
        Some(user.user_id),
        "message_send",
        "messages",
        serde_json::json!({ "message_id": message.id, "receiver_id": receiver_id }),
    )
    .await;

    let delivered = state
        .presence
        .send_to(receiver_id, ServerEvent::ReceiveMessage(message.clone()))
        .await;
    tracing::debug!(message_id = %message.id, delivered, "message stored");

    Ok(ApiResponse::success("Message sent", message, Some(Meta::empty())))
}
