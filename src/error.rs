/// Errors surfaced to the acting connection. Every variant maps to a stable
/// wire code plus the human-readable acknowledgement string clients display.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChatError {
    /// Missing, wrong-typed, or otherwise malformed input.
    #[error("{0}")]
    Validation(String),
    /// Another connection already holds this name in the same room.
    #[error("Username is already taken")]
    DuplicateName,
    /// Operation attempted by a connection that is not joined to a room.
    #[error("User not found")]
    UserNotFound,
    #[error("Message is too long (max 5000 characters)")]
    MessageTooLong,
    /// Unexpected failure in broadcast or lookup.
    #[error("{0}")]
    Internal(String),
}

impl ChatError {
    /// Stable machine-readable code for the wire protocol.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "VALIDATION",
            ChatError::DuplicateName => "DUPLICATE_NAME",
            ChatError::UserNotFound => "USER_NOT_FOUND",
            ChatError::MessageTooLong => "MESSAGE_TOO_LONG",
            ChatError::Internal(_) => "INTERNAL",
        }
    }
}
