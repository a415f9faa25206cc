use axum::{
    extract::{
        State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppResult,
    extract::AppQuery,
    middleware::auth::{AuthUser, authenticate},
    models::Message,
    presence::{ClientEvent, PresenceHub, ServerEvent},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

/// Upgrades to the presence socket. The token is checked before the upgrade.
pub async fn ws_handler(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<WsParams>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let user = authenticate(&state, &params.token).await?;
    let hub = state.presence.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, user)))
}

async fn handle_socket(mut socket: WebSocket, hub: PresenceHub, user: AuthUser) {
    let (connection, mut events) = hub.connect().await;
    tracing::debug!(user_id = %user.user_id, %connection, "socket connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_client_event(&hub, &user, connection, text.as_str()).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "socket read failed");
                        break;
                    }
                }
            }
            outgoing = events.recv() => {
                let Some(event) = outgoing else { break };
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to encode socket event");
                        continue;
                    }
                };
                if socket.send(WsMessage::Text(payload.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.disconnect(connection).await;
    tracing::debug!(user_id = %user.user_id, %connection, "socket disconnected");
}

async fn handle_client_event(hub: &PresenceHub, user: &AuthUser, connection: Uuid, raw: &str) {
    let event = match serde_json::from_str::<ClientEvent>(raw) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(error = %err, "ignoring malformed socket event");
            return;
        }
    };

    match event {
        ClientEvent::Register(user_id) => {
            if user_id != user.user_id {
                tracing::warn!(claimed = %user_id, actual = %user.user_id, "register for another user ignored");
                return;
            }
            hub.register(user_id, connection).await;
        }
        ClientEvent::SendMessage(relay) => {
            let message = Message {
                id: Uuid::new_v4(),
                sender_id: user.user_id,
                receiver_id: relay.receiver_id,
                text: relay.text,
                image: relay.image,
                created_at: Utc::now(),
            };
            hub.send_to(relay.receiver_id, ServerEvent::ReceiveMessage(message))
                .await;
        }
    }
}
