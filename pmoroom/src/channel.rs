//! Session channel contract and tokio glue.
//!
//! The transport itself (socket, reconnection policy, framing on the
//! network) lives outside this crate. The core only needs an ordered,
//! at-most-once `send`, and a stream of inbound `WireMessage`s. When that
//! stream ends the session is lost: there is no automatic resume.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::RoomError;
use crate::protocol::{AuthorityEvent, ClientEvent, WireMessage};
use crate::room::RoomClient;

pub trait SessionChannel: Send {
    /// Sends one event to the authority. Failing to send is fatal to the
    /// session and must be reported as `SessionLost`.
    fn send(&self, event: &ClientEvent) -> Result<(), RoomError>;
}

/// `SessionChannel` backed by a tokio unbounded queue of wire frames.
///
/// The receiving half is handed to whatever task writes to the network.
#[derive(Clone, Debug)]
pub struct MpscSessionChannel {
    tx: mpsc::UnboundedSender<WireMessage>,
}

impl MpscSessionChannel {
    pub fn new(tx: mpsc::UnboundedSender<WireMessage>) -> Self {
        Self { tx }
    }

    /// Creates a channel together with its outbound frame stream.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<WireMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl SessionChannel for MpscSessionChannel {
    fn send(&self, event: &ClientEvent) -> Result<(), RoomError> {
        let frame = event.to_wire()?;
        debug!(event = frame.event.as_str(), "Sending session event");
        self.tx
            .send(frame)
            .map_err(|_| RoomError::session_lost("session channel closed"))
    }
}

/// Feeds inbound frames to `room` until the stream ends or the session is
/// no longer usable.
///
/// Malformed frames are logged and skipped. The end of the stream marks
/// the session lost.
pub async fn pump_authority_events(room: RoomClient, mut inbound: mpsc::UnboundedReceiver<WireMessage>) {
    while let Some(frame) = inbound.recv().await {
        match AuthorityEvent::from_wire(&frame) {
            Ok(event) => {
                if let Err(err) = room.handle_event(event) {
                    warn!(event = frame.event.as_str(), error = %err, "Failed to apply session event");
                }
            }
            Err(err) => {
                warn!(event = frame.event.as_str(), error = %err, "Dropping malformed session frame");
            }
        }
        if room.is_closed() {
            debug!("Room closed, stopping event pump");
            return;
        }
    }
    room.session_lost("session channel disconnected");
}
