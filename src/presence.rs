use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::{
    RwLock,
    mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use uuid::Uuid;

use crate::models::Message;

pub type ConnectionId = Uuid;

/// Events a socket client may send.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Register(Uuid),
    SendMessage(RelayMessage),
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct RelayMessage {
    pub receiver_id: Uuid,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: String,
}

/// Events pushed to socket clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    OnlineUsers(Vec<Uuid>),
    ReceiveMessage(Message),
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, UnboundedSender<ServerEvent>>,
    users: HashMap<Uuid, ConnectionId>,
}

/// In-memory map of connected users to their socket. Nothing survives a restart.
#[derive(Clone, Default)]
pub struct PresenceHub {
    inner: Arc<RwLock<HubState>>,
}

impl PresenceHub {
    /// Opens a new connection slot. Events for it arrive on the returned receiver.
    pub async fn connect(&self) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.inner.write().await.connections.insert(id, tx);
        (id, rx)
    }

    /// Binds `user_id` to `connection`, replacing any older binding, then
    /// broadcasts the online list.
    pub async fn register(&self, user_id: Uuid, connection: ConnectionId) {
        {
            let mut state = self.inner.write().await;
            if !state.connections.contains_key(&connection) {
                return;
            }
            if let Some(previous) = state.users.insert(user_id, connection) {
                if previous != connection {
                    tracing::debug!(%user_id, "presence binding replaced");
                }
            }
        }
        self.broadcast_online().await;
    }

    /// Drops `connection`. A user binding is removed only if it still points here.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let changed = {
            let mut state = self.inner.write().await;
            state.connections.remove(&connection);
            let before = state.users.len();
            state.users.retain(|_, bound| *bound != connection);
            before != state.users.len()
        };
        if changed {
            self.broadcast_online().await;
        }
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        let state = self.inner.read().await;
        let mut ids: Vec<Uuid> = state.users.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Pushes `event` to the user's bound connection. Returns whether it was queued.
    pub async fn send_to(&self, user_id: Uuid, event: ServerEvent) -> bool {
        let state = self.inner.read().await;
        let Some(sender) = state
            .users
            .get(&user_id)
            .and_then(|conn| state.connections.get(conn))
        else {
            return false;
        };
        if sender.send(event).is_err() {
            tracing::warn!(%user_id, "socket push dropped, receiver closed");
            return false;
        }
        true
    }

    async fn broadcast_online(&self) {
        let users = self.online_users().await;
        let state = self.inner.read().await;
        for sender in state.connections.values() {
            let _ = sender.send(ServerEvent::OnlineUsers(users.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(receiver_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            receiver_id,
            text: "hola".into(),
            image: String::new(),
            created_at: Utc::now(),
        }
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn register_broadcasts_online_users_to_everyone() {
        let hub = PresenceHub::default();
        let (conn_a, mut rx_a) = hub.connect().await;
        let (_conn_b, mut rx_b) = hub.connect().await;
        let user = Uuid::new_v4();

        hub.register(user, conn_a).await;

        assert_eq!(drain(&mut rx_a), vec![ServerEvent::OnlineUsers(vec![user])]);
        assert_eq!(drain(&mut rx_b), vec![ServerEvent::OnlineUsers(vec![user])]);
        assert!(hub.online_users().await.contains(&user));
    }

    #[tokio::test]
    async fn send_to_reaches_only_the_bound_connection() {
        let hub = PresenceHub::default();
        let (conn, mut rx) = hub.connect().await;
        let (_other, mut other_rx) = hub.connect().await;
        let user = Uuid::new_v4();
        hub.register(user, conn).await;
        drain(&mut rx);
        drain(&mut other_rx);

        let msg = message(user);
        assert!(hub.send_to(user, ServerEvent::ReceiveMessage(msg.clone())).await);
        assert_eq!(drain(&mut rx), vec![ServerEvent::ReceiveMessage(msg)]);
        assert!(drain(&mut other_rx).is_empty());

        assert!(!hub.send_to(Uuid::new_v4(), ServerEvent::OnlineUsers(vec![])).await);
    }

    #[tokio::test]
    async fn re_register_replaces_and_stale_disconnect_keeps_binding() {
        let hub = PresenceHub::default();
        let user = Uuid::new_v4();
        let (old_conn, _old_rx) = hub.connect().await;
        let (new_conn, mut new_rx) = hub.connect().await;

        hub.register(user, old_conn).await;
        hub.register(user, new_conn).await;
        hub.disconnect(old_conn).await;

        assert_eq!(hub.online_users().await, vec![user]);
        drain(&mut new_rx);
        assert!(hub.send_to(user, ServerEvent::ReceiveMessage(message(user))).await);
        assert_eq!(drain(&mut new_rx).len(), 1);

        hub.disconnect(new_conn).await;
        assert!(hub.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn register_on_unknown_connection_is_ignored() {
        let hub = PresenceHub::default();
        hub.register(Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(hub.online_users().await.is_empty());
    }

    #[test]
    fn events_use_event_and_data_fields() {
        let user = Uuid::nil();
        let json = serde_json::to_value(ServerEvent::OnlineUsers(vec![user])).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "event": "online-users", "data": [user] })
        );

        let parsed: ClientEvent = serde_json::from_value(serde_json::json!({
            "event": "send-message",
            "data": { "receiver_id": user, "text": "hi" }
        }))
        .unwrap();
        assert_eq!(
            parsed,
            ClientEvent::SendMessage(RelayMessage {
                receiver_id: user,
                text: "hi".into(),
                image: String::new(),
            })
        );
    }
}
