use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::model::{MediaReference, PlaybackState, Role};
use crate::permissions::PermissionSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Notifications for the screens observing a room.
#[derive(Clone, Debug, PartialEq)]
pub enum RoomEvent {
    Joined {
        room_id: String,
        role: Role,
        permissions: PermissionSet,
    },
    /// The queue the participant should see changed.
    QueueChanged {
        tracks: Vec<MediaReference>,
    },
    PlaybackChanged(PlaybackState),
    /// User-visible message (refusals, confirmations, failures).
    Notice {
        level: NoticeLevel,
        message: String,
    },
    SessionLost {
        reason: String,
    },
}

impl RoomEvent {
    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        RoomEvent::Notice {
            level,
            message: message.into(),
        }
    }
}

#[derive(Clone, Default)]
pub struct RoomEventBus {
    subscribers: Arc<Mutex<Vec<Sender<RoomEvent>>>>,
}

impl RoomEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<RoomEvent> {
        let (tx, rx) = unbounded::<RoomEvent>();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn broadcast(&self, event: RoomEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
