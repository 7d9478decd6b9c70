//! Permission gate for locally initiated room actions.
//!
//! The gate only decides what the local UI lets a participant attempt.
//! The session authority may still reject anything it receives, so a
//! positive answer here is never proof of authorization.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::RoomError;

/// Actions subject to the permission gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    PlayPause,
    ControlVolume,
    Sync,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::PlayPause => "play_pause",
            Action::ControlVolume => "control_volume",
            Action::Sync => "sync",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities granted at join time. Read-only for the rest of the session.
///
/// `Default` grants nothing: a member that has not been accepted yet can
/// not act on the room.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub can_control_volume: bool,
    pub can_play: bool,
    pub can_sync: bool,
}

impl PermissionSet {
    /// The host always holds every capability.
    pub fn host() -> Self {
        Self {
            can_control_volume: true,
            can_play: true,
            can_sync: true,
        }
    }

    pub fn allows(&self, action: Action) -> bool {
        allow(action, self)
    }

    /// Fails with `PermissionDenied` when the action is not allowed.
    pub fn require(&self, action: Action) -> Result<(), RoomError> {
        if self.allows(action) {
            Ok(())
        } else {
            Err(RoomError::PermissionDenied(action))
        }
    }
}

pub fn allow(action: Action, permissions: &PermissionSet) -> bool {
    match action {
        Action::PlayPause => permissions.can_play,
        Action::ControlVolume => permissions.can_control_volume,
        Action::Sync => permissions.can_sync,
    }
}

/// User-facing refusal text for a denied action.
pub fn refusal_message(action: Action) -> &'static str {
    match action {
        Action::PlayPause => "The host does not allow members to control playback",
        Action::ControlVolume => "The host does not allow members to change the volume",
        Action::Sync => "The host does not allow members to sync",
    }
}
