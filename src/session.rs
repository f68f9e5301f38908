//! Per-connection lifecycle: `Unjoined` -> `Joined` -> `Closed`.
//!
//! One `Session` exists per connection and is driven sequentially by that
//! connection's socket loop. Cross-connection interleavings are resolved by
//! the registry; the session only tracks where its own connection is in the
//! join/leave protocol and turns inbound events into registry calls and
//! room broadcasts.

use std::sync::Arc;

use serde_json::Value;

use crate::broadcast::{self, Outbox};
use crate::error::ChatError;
use crate::protocol::{ClientMessage, ServerMessage, MAX_MESSAGE_CHARS};
use crate::registry::Registry;
use crate::types::ConnectionId;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Unjoined,
    Joined { room: String },
    /// Terminal. No transition leaves this state.
    Closed,
}

pub struct Session {
    id: ConnectionId,
    registry: Arc<Registry>,
    /// This connection's own outbound channel, for private replies.
    outbox: Outbox,
    state: SessionState,
}

impl Session {
    pub fn new(id: ConnectionId, registry: Arc<Registry>, outbox: Outbox) -> Self {
        Self {
            id,
            registry,
            outbox,
            state: SessionState::Unjoined,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Dispatch one inbound event. Returns the failure acknowledgement to
    /// send back to this connection, if any; broadcasts to the room happen
    /// as a side effect. Validation and duplicate-name failures are never
    /// broadcast and never terminate the connection.
    pub async fn handle_message(&mut self, msg: ClientMessage) -> Option<ServerMessage> {
        if self.state == SessionState::Closed {
            return None;
        }
        match msg {
            ClientMessage::Join { name, room } => self
                .handle_join(name, room)
                .await
                .err()
                .map(|e| ServerMessage::error(&e)),
            ClientMessage::SendMessage { text } => self
                .handle_send_message(text)
                .await
                .err()
                .map(|e| ServerMessage::error(&e)),
            ClientMessage::Typing { is_typing } => {
                self.handle_typing(is_typing).await;
                None
            }
        }
    }

    async fn handle_join(&mut self, name: Value, room: Value) -> Result<(), ChatError> {
        if matches!(self.state, SessionState::Joined { .. }) {
            // Re-joining from a live session is not a rename or a room move.
            return Err(ChatError::Validation("Already joined a room".to_string()));
        }
        if name.is_null() || room.is_null() {
            return Err(ChatError::Validation("Name and room are required".to_string()));
        }
        let (Some(name), Some(room)) = (name.as_str(), room.as_str()) else {
            return Err(ChatError::Validation(
                "Name and room must be strings".to_string(),
            ));
        };

        let update = self.registry.add_binding(&self.id, name, room).await?;
        let user = &update.binding;
        self.state = SessionState::Joined {
            room: user.room.clone(),
        };
        tracing::info!(conn = %self.id, name = %user.name, room = %user.room, "joined room");

        self.outbox.send(ServerMessage::admin(format!(
            "{}, welcome to the room {}",
            user.name, user.room
        )));
        broadcast::broadcast(
            &update.members,
            &ServerMessage::admin(format!("{} has joined", user.name)),
            Some(&self.id),
        );
        broadcast::broadcast(
            &update.members,
            &broadcast::room_data(&user.room, &update.members),
            None,
        );
        Ok(())
    }

    async fn handle_send_message(&mut self, text: Value) -> Result<(), ChatError> {
        let text = match text.as_str() {
            Some(t) if !t.is_empty() => t,
            _ => return Err(ChatError::Validation("Invalid message format".to_string())),
        };
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ChatError::MessageTooLong);
        }
        if !matches!(self.state, SessionState::Joined { .. }) {
            return Err(ChatError::UserNotFound);
        }

        // Snapshot again through the registry: a disconnect signal racing
        // this message may already have removed the binding.
        let update = self
            .registry
            .room_update_for(&self.id)
            .await
            .ok_or(ChatError::UserNotFound)?;
        let user = &update.binding;

        broadcast::broadcast(
            &update.members,
            &ServerMessage::chat(&user.name, text.trim()),
            None,
        );
        broadcast::broadcast(
            &update.members,
            &broadcast::room_data(&user.room, &update.members),
            None,
        );
        Ok(())
    }

    /// Typing indicators are fire-and-forget: malformed or out-of-state
    /// calls are dropped without an ack.
    async fn handle_typing(&mut self, is_typing: Value) {
        let Some(is_typing) = is_typing.as_bool() else {
            return;
        };
        if !matches!(self.state, SessionState::Joined { .. }) {
            return;
        }
        let Some(update) = self.registry.room_update_for(&self.id).await else {
            return;
        };

        broadcast::broadcast(
            &update.members,
            &ServerMessage::UserTyping {
                user: update.binding.name.clone(),
                is_typing,
            },
            Some(&self.id),
        );
    }

    /// Transport-level disconnect. Valid from any state and idempotent: a
    /// duplicate close signal is a no-op, so a departure is announced at
    /// most once.
    pub async fn close(&mut self, reason: &str) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        tracing::info!(conn = %self.id, reason, "session closed");

        if let Some(update) = self.registry.remove_binding(&self.id).await {
            let user = &update.binding;
            broadcast::broadcast(
                &update.members,
                &ServerMessage::admin(format!("{} has left.", user.name)),
                None,
            );
            broadcast::broadcast(
                &update.members,
                &broadcast::room_data(&user.room, &update.members),
                None,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn connect(registry: &Arc<Registry>, id: &str) -> (Session, UnboundedReceiver<ServerMessage>) {
        let (outbox, rx) = Outbox::new();
        registry.attach(id.to_string(), outbox.clone()).await;
        (Session::new(id.to_string(), registry.clone(), outbox), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn join(name: Value, room: Value) -> ClientMessage {
        ClientMessage::Join { name, room }
    }

    fn assert_error(ack: Option<ServerMessage>, expected_code: &str, expected_msg: &str) {
        match ack {
            Some(ServerMessage::Error { code, msg }) => {
                assert_eq!(code, expected_code);
                assert_eq!(msg, expected_msg);
            }
            other => panic!("expected error ack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_requires_both_fields() {
        let registry = Arc::new(Registry::new());
        let (mut session, mut rx) = connect(&registry, "c1").await;

        let ack = session.handle_message(join(Value::Null, json!("x"))).await;
        assert_error(ack, "VALIDATION", "Name and room are required");
        assert_eq!(*session.state(), SessionState::Unjoined);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_join_requires_string_fields() {
        let registry = Arc::new(Registry::new());
        let (mut session, _rx) = connect(&registry, "c1").await;

        let ack = session.handle_message(join(json!(42), json!("x"))).await;
        assert_error(ack, "VALIDATION", "Name and room must be strings");
        assert_eq!(*session.state(), SessionState::Unjoined);
    }

    #[tokio::test]
    async fn test_join_success_transitions_and_replies() {
        let registry = Arc::new(Registry::new());
        let (mut session, mut rx) = connect(&registry, "c1").await;

        let ack = session.handle_message(join(json!("Alice"), json!("Lobby"))).await;
        assert!(ack.is_none());
        assert_eq!(
            *session.state(),
            SessionState::Joined {
                room: "lobby".to_string()
            }
        );

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2, "expected welcome + roster, got {:?}", events);
        assert!(matches!(
            &events[0],
            ServerMessage::Message { user, text, .. }
                if user == "admin" && text == "alice, welcome to the room lobby"
        ));
        assert!(matches!(
            &events[1],
            ServerMessage::RoomData { room, users } if room == "lobby" && users.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_duplicate_join_acks_without_broadcast() {
        let registry = Arc::new(Registry::new());
        let (mut alice, mut alice_rx) = connect(&registry, "c1").await;
        let (mut bob, mut bob_rx) = connect(&registry, "c2").await;

        alice.handle_message(join(json!("alice"), json!("x"))).await;
        drain(&mut alice_rx);

        let ack = bob.handle_message(join(json!("alice"), json!("x"))).await;
        assert_error(ack, "DUPLICATE_NAME", "Username is already taken");
        assert_eq!(*bob.state(), SessionState::Unjoined);
        assert!(drain(&mut bob_rx).is_empty());
        // Alice saw nothing: the failed join is reported to the caller only.
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_second_join_from_same_connection_rejected() {
        let registry = Arc::new(Registry::new());
        let (mut session, mut rx) = connect(&registry, "c1").await;

        session.handle_message(join(json!("alice"), json!("x"))).await;
        drain(&mut rx);

        let ack = session.handle_message(join(json!("alice2"), json!("y"))).await;
        assert_error(ack, "VALIDATION", "Already joined a room");
        assert_eq!(
            *session.state(),
            SessionState::Joined {
                room: "x".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_message_before_join_is_user_not_found() {
        let registry = Arc::new(Registry::new());
        let (mut session, _rx) = connect(&registry, "c1").await;

        let ack = session
            .handle_message(ClientMessage::SendMessage { text: json!("hi") })
            .await;
        assert_error(ack, "USER_NOT_FOUND", "User not found");
    }

    #[tokio::test]
    async fn test_message_validation() {
        let registry = Arc::new(Registry::new());
        let (mut session, mut rx) = connect(&registry, "c1").await;
        session.handle_message(join(json!("alice"), json!("x"))).await;
        drain(&mut rx);

        let ack = session
            .handle_message(ClientMessage::SendMessage { text: json!(7) })
            .await;
        assert_error(ack, "VALIDATION", "Invalid message format");

        let ack = session
            .handle_message(ClientMessage::SendMessage { text: json!("") })
            .await;
        assert_error(ack, "VALIDATION", "Invalid message format");
    }

    #[tokio::test]
    async fn test_message_length_boundary() {
        let registry = Arc::new(Registry::new());
        let (mut session, mut rx) = connect(&registry, "c1").await;
        session.handle_message(join(json!("alice"), json!("x"))).await;
        drain(&mut rx);

        let at_limit = "a".repeat(MAX_MESSAGE_CHARS);
        let ack = session
            .handle_message(ClientMessage::SendMessage { text: json!(at_limit) })
            .await;
        assert!(ack.is_none(), "exactly {MAX_MESSAGE_CHARS} chars is accepted");

        let over_limit = "a".repeat(MAX_MESSAGE_CHARS + 1);
        let ack = session
            .handle_message(ClientMessage::SendMessage { text: json!(over_limit) })
            .await;
        assert_error(
            ack,
            "MESSAGE_TOO_LONG",
            "Message is too long (max 5000 characters)",
        );
    }

    #[tokio::test]
    async fn test_message_text_is_trimmed() {
        let registry = Arc::new(Registry::new());
        let (mut session, mut rx) = connect(&registry, "c1").await;
        session.handle_message(join(json!("alice"), json!("x"))).await;
        drain(&mut rx);

        session
            .handle_message(ClientMessage::SendMessage { text: json!("  hi there  ") })
            .await;
        let events = drain(&mut rx);
        assert!(matches!(
            &events[0],
            ServerMessage::Message { user, text, .. } if user == "alice" && text == "hi there"
        ));
    }

    #[tokio::test]
    async fn test_typing_outside_room_is_silent() {
        let registry = Arc::new(Registry::new());
        let (mut session, mut rx) = connect(&registry, "c1").await;

        let ack = session
            .handle_message(ClientMessage::Typing { is_typing: json!(true) })
            .await;
        assert!(ack.is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_typing_excludes_sender() {
        let registry = Arc::new(Registry::new());
        let (mut alice, mut alice_rx) = connect(&registry, "c1").await;
        let (mut bob, mut bob_rx) = connect(&registry, "c2").await;
        alice.handle_message(join(json!("alice"), json!("x"))).await;
        bob.handle_message(join(json!("bob"), json!("x"))).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let ack = bob
            .handle_message(ClientMessage::Typing { is_typing: json!(true) })
            .await;
        assert!(ack.is_none());

        let events = drain(&mut alice_rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            ServerMessage::UserTyping { user, is_typing } if user == "bob" && *is_typing
        ));
        assert!(drain(&mut bob_rx).is_empty());

        // Malformed payloads are dropped without an ack.
        let ack = bob
            .handle_message(ClientMessage::Typing { is_typing: json!("yes") })
            .await;
        assert!(ack.is_none());
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let registry = Arc::new(Registry::new());
        let (mut alice, mut alice_rx) = connect(&registry, "c1").await;
        let (mut bob, mut bob_rx) = connect(&registry, "c2").await;
        alice.handle_message(join(json!("alice"), json!("x"))).await;
        bob.handle_message(join(json!("bob"), json!("x"))).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        alice.close("transport closed").await;
        assert_eq!(*alice.state(), SessionState::Closed);
        let events = drain(&mut bob_rx);
        assert_eq!(events.len(), 2, "departure announce + roster");

        // A duplicate disconnect signal announces nothing.
        alice.close("transport closed").await;
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn test_close_before_join_announces_nothing() {
        let registry = Arc::new(Registry::new());
        let (mut alice, mut alice_rx) = connect(&registry, "c1").await;
        let (mut bob, mut bob_rx) = connect(&registry, "c2").await;
        bob.handle_message(join(json!("bob"), json!("x"))).await;
        drain(&mut bob_rx);

        alice.close("gone before joining").await;
        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn test_closed_session_ignores_events() {
        let registry = Arc::new(Registry::new());
        let (mut session, mut rx) = connect(&registry, "c1").await;
        session.handle_message(join(json!("alice"), json!("x"))).await;
        session.close("done").await;
        drain(&mut rx);

        let ack = session
            .handle_message(ClientMessage::SendMessage { text: json!("hi") })
            .await;
        assert!(ack.is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_message_racing_removal_is_user_not_found() {
        let registry = Arc::new(Registry::new());
        let (mut session, mut rx) = connect(&registry, "c1").await;
        session.handle_message(join(json!("alice"), json!("x"))).await;
        drain(&mut rx);

        // The registry has already processed the disconnect, but this
        // session's own state is still Joined.
        registry.remove_binding(&"c1".to_string()).await;

        let ack = session
            .handle_message(ClientMessage::SendMessage { text: json!("hi") })
            .await;
        assert_error(ack, "USER_NOT_FOUND", "User not found");
    }
}
