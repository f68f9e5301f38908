//! Room-scoped fan-out to connection outboxes.
//!
//! Broadcasts always operate on a membership snapshot returned by the
//! registry call that triggered them, so the roster a receiver observes is
//! the one that existed at the instant of the mutation.

use crate::protocol::ServerMessage;
use crate::types::{Binding, ConnectionId};
use tokio::sync::mpsc;

/// Outbound channel handle for one connection. Sends never block; a slow or
/// unreachable peer is the transport layer's concern.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Outbox {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a message for delivery. Returns false if the receiver is gone.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

/// One room member as captured by a registry snapshot.
#[derive(Debug, Clone)]
pub struct Member {
    pub binding: Binding,
    pub outbox: Outbox,
}

/// Deliver `msg` to every member except `exclude`. Best-effort per member:
/// a closed receiver never fails the calling operation or starves the rest
/// of the room.
pub fn broadcast(members: &[Member], msg: &ServerMessage, exclude: Option<&ConnectionId>) {
    for member in members {
        if exclude.is_some_and(|id| *id == member.binding.id) {
            continue;
        }
        if !member.outbox.send(msg.clone()) {
            tracing::debug!(conn = %member.binding.id, "skipping broadcast to closed outbox");
        }
    }
}

/// Roster event for a room membership snapshot.
pub fn room_data(room: &str, members: &[Member]) -> ServerMessage {
    ServerMessage::RoomData {
        room: room.to_string(),
        users: members.iter().map(|m| m.binding.clone()).collect(),
    }
}
