//! Room membership lifecycle.
//!
//! One place decides whether the session is usable, and one notification
//! point (`on_session_lost`) tells every observer when it is not. There is
//! no automatic resume: a lost session means re-joining from scratch.

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{info, warn};

use crate::errors::RoomError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Not in a room.
    Idle,
    /// Membership requested, waiting for the authority.
    Joining { room_id: String },
    Active { room_id: String },
    /// The channel dropped or the room was torn down.
    Lost { reason: String },
    /// The participant left on their own.
    Left,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionLost {
    pub room_id: Option<String>,
    pub reason: String,
}

pub struct SessionLifecycle {
    state: SessionState,
    listeners: Vec<Sender<SessionLost>>,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn room_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Joining { room_id } | SessionState::Active { room_id } => Some(room_id.as_str()),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }

    /// Returns a receiver that gets exactly one message when the session is lost.
    pub fn on_session_lost(&mut self) -> Receiver<SessionLost> {
        let (tx, rx) = bounded(1);
        if let SessionState::Lost { reason } = &self.state {
            let _ = tx.send(SessionLost {
                room_id: None,
                reason: reason.clone(),
            });
        } else {
            self.listeners.push(tx);
        }
        rx
    }

    /// Errors unless the room is active.
    pub fn ensure_active(&self) -> Result<(), RoomError> {
        match &self.state {
            SessionState::Active { .. } => Ok(()),
            SessionState::Lost { reason } => Err(RoomError::SessionLost(reason.clone())),
            _ => Err(RoomError::NotJoined),
        }
    }

    pub fn begin_join(&mut self, room_id: &str) -> Result<(), RoomError> {
        match &self.state {
            SessionState::Idle | SessionState::Left => {
                self.state = SessionState::Joining {
                    room_id: room_id.to_string(),
                };
                Ok(())
            }
            SessionState::Lost { reason } => Err(RoomError::SessionLost(reason.clone())),
            SessionState::Joining { room_id: current } | SessionState::Active { room_id: current } => {
                Err(RoomError::InvalidRoomId(format!("already in room {}", current)))
            }
        }
    }

    /// Moves from `Joining` to `Active`. Returns the room id on success.
    pub fn activate(&mut self) -> Option<String> {
        match &self.state {
            SessionState::Joining { room_id } => {
                let room_id = room_id.clone();
                info!(room = room_id.as_str(), "Room joined");
                self.state = SessionState::Active {
                    room_id: room_id.clone(),
                };
                Some(room_id)
            }
            _ => None,
        }
    }

    /// The authority refused the join; back to the pre-room state.
    pub fn reject(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Joining { room_id } => Some(room_id),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Marks the session lost and notifies listeners. Only the first call
    /// has an effect; returns `true` in that case.
    pub fn mark_lost(&mut self, reason: &str) -> bool {
        if matches!(self.state, SessionState::Lost { .. } | SessionState::Left) {
            return false;
        }
        let room_id = self.room_id().map(str::to_string);
        warn!(room = ?room_id, reason, "Session lost");
        self.state = SessionState::Lost {
            reason: reason.to_string(),
        };

        let notice = SessionLost {
            room_id,
            reason: reason.to_string(),
        };
        for tx in self.listeners.drain(..) {
            let _ = tx.send(notice.clone());
        }
        true
    }

    /// Leaves without notifying `on_session_lost` listeners.
    pub fn leave(&mut self) {
        if !matches!(self.state, SessionState::Lost { .. }) {
            self.state = SessionState::Left;
        }
        self.listeners.clear();
    }
}
