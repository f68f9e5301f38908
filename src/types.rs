use serde::{Deserialize, Serialize};

/// Opaque ID type for type safety
pub type ConnectionId = String;

/// The live association between one connection, one display name and one
/// room. Name and room are stored normalized (trimmed, lowercased), so
/// equality on them is the case-insensitive identity the room contract
/// promises. Serialized as-is into the `roomData` roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub id: ConnectionId,
    pub name: String,
    pub room: String,
}
