//! Authoritative table of (connection, name, room) bindings.
//!
//! One instance is owned by the server process and injected into every
//! connection handler. The single `RwLock` is the serialization point for
//! all room mutations: check-and-insert runs as one critical section, and
//! every mutating call returns the membership snapshot computed under the
//! same lock hold, so broadcasts never observe a half-applied mutation.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::broadcast::{Member, Outbox};
use crate::error::ChatError;
use crate::types::{Binding, ConnectionId};

/// Result of a mutating registry call: the binding acted on, plus the
/// membership of its room at the same instant (join order).
#[derive(Debug, Clone)]
pub struct RoomUpdate {
    pub binding: Binding,
    pub members: Vec<Member>,
}

#[derive(Default)]
struct RegistryInner {
    /// Live bindings in join order.
    bindings: Vec<Binding>,
    /// Outbound channels for attached connections, joined or not.
    outboxes: HashMap<ConnectionId, Outbox>,
}

impl RegistryInner {
    fn members_of(&self, room: &str) -> Vec<Member> {
        self.bindings
            .iter()
            .filter(|b| b.room == room)
            .filter_map(|b| {
                let outbox = self.outboxes.get(&b.id)?.clone();
                Some(Member {
                    binding: b.clone(),
                    outbox,
                })
            })
            .collect()
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Registry of active bindings and their outbound channels.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel at socket accept.
    pub async fn attach(&self, id: ConnectionId, outbox: Outbox) {
        self.inner.write().await.outboxes.insert(id, outbox);
    }

    /// Drop a connection's outbound channel at socket teardown.
    pub async fn detach(&self, id: &ConnectionId) {
        self.inner.write().await.outboxes.remove(id);
    }

    /// Number of attached connections, joined or not.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.outboxes.len()
    }

    /// Normalize, check and insert a binding in one critical section.
    ///
    /// Concurrent joins racing for the same (room, name) see exactly one
    /// success; every loser gets `DuplicateName`. A connection that already
    /// holds a binding is rejected, keeping the one-binding-per-connection
    /// invariant even if the caller's own state tracking is stale.
    pub async fn add_binding(
        &self,
        id: &ConnectionId,
        name: &str,
        room: &str,
    ) -> Result<RoomUpdate, ChatError> {
        let name = normalize(name);
        let room = normalize(room);
        if name.is_empty() || room.is_empty() {
            return Err(ChatError::Validation("Name and room are required".to_string()));
        }

        let mut inner = self.inner.write().await;
        if inner.bindings.iter().any(|b| b.id == *id) {
            return Err(ChatError::Validation("Already joined a room".to_string()));
        }
        if inner.bindings.iter().any(|b| b.room == room && b.name == name) {
            return Err(ChatError::DuplicateName);
        }

        let binding = Binding {
            id: id.clone(),
            name,
            room,
        };
        inner.bindings.push(binding.clone());
        let members = inner.members_of(&binding.room);
        Ok(RoomUpdate { binding, members })
    }

    /// Remove a connection's binding, returning it together with the
    /// remaining members of its room. Idempotent: an id with no binding
    /// yields `None`, never an error.
    pub async fn remove_binding(&self, id: &ConnectionId) -> Option<RoomUpdate> {
        let mut inner = self.inner.write().await;
        let index = inner.bindings.iter().position(|b| b.id == *id)?;
        let binding = inner.bindings.remove(index);
        let members = inner.members_of(&binding.room);
        Some(RoomUpdate { binding, members })
    }

    pub async fn get_binding(&self, id: &ConnectionId) -> Option<Binding> {
        self.inner
            .read()
            .await
            .bindings
            .iter()
            .find(|b| b.id == *id)
            .cloned()
    }

    /// Members of a room in join order.
    pub async fn list_room(&self, room: &str) -> Vec<Binding> {
        let room = normalize(room);
        self.inner
            .read()
            .await
            .bindings
            .iter()
            .filter(|b| b.room == room)
            .cloned()
            .collect()
    }

    /// A connection's binding plus its room membership, captured in a single
    /// lock acquisition. Serves message/typing broadcasts without racing a
    /// concurrent join or leave.
    pub async fn room_update_for(&self, id: &ConnectionId) -> Option<RoomUpdate> {
        let inner = self.inner.read().await;
        let binding = inner.bindings.iter().find(|b| b.id == *id)?.clone();
        let members = inner.members_of(&binding.room);
        Some(RoomUpdate { binding, members })
    }
}
