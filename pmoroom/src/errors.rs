use thiserror::Error;

use crate::permissions::Action;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoomError {
    /// The URL does not resolve to a media id. Nothing was mutated.
    #[error("Invalid media reference: {0}")]
    InvalidReference(String),
    #[error("Permission denied for action '{0}'")]
    PermissionDenied(Action),
    #[error("Sync unavailable: {0}")]
    SyncUnavailable(String),
    /// Fatal to the room membership: the client must go back to the pre-room screen.
    #[error("Session lost: {0}")]
    SessionLost(String),
    #[error("Not joined to a room")]
    NotJoined,
    #[error("Invalid room id: {0:?}")]
    InvalidRoomId(String),
    #[error("Room not found: {0}")]
    RoomNotFound(String),
    #[error("Unknown track {0}")]
    UnknownTrack(String),
    #[error("No current track")]
    NoCurrentTrack,
    #[error("Queue is empty")]
    EmptyQueue,
    #[error("Reorder Error: {0}")]
    Reorder(String),
    #[error("Protocol Error: {0}")]
    Protocol(String),
}

impl RoomError {
    pub fn sync_unavailable(reason: &str) -> Self {
        RoomError::SyncUnavailable(reason.to_string())
    }

    pub fn session_lost(reason: &str) -> Self {
        RoomError::SessionLost(reason.to_string())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        RoomError::Protocol(message.into())
    }

    /// Returns true if the error ends the room membership.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RoomError::SessionLost(_))
    }
}
