//! Client core for synchronized room playback.
//!
//! A host creates a room, members join it, and every participant keeps a
//! local projection of the shared track queue and playhead that converges
//! on what the session authority pushes. The transport and the embedded
//! media player stay outside: they plug in through [`SessionChannel`] and
//! [`MediaWidget`].

pub mod channel;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod model;
pub mod permissions;
pub mod playback;
pub mod protocol;
pub mod queue;
pub mod resolver;
pub mod room;
pub mod settings;
pub mod sync;

#[cfg(feature = "pmoconfig")]
pub mod logging;

#[cfg(test)]
mod testing;

pub use channel::{MpscSessionChannel, SessionChannel, pump_authority_events};
pub use errors::RoomError;
pub use events::{NoticeLevel, RoomEvent, RoomEventBus};
pub use lifecycle::{SessionLifecycle, SessionLost, SessionState};
pub use model::{MediaReference, PlaybackPhase, PlaybackState, PlayerState, Role, SyncSnapshot};
pub use permissions::{Action, PermissionSet, allow};
pub use playback::{
    LoadGeneration, MediaWidget, PlaybackMachine, SkipDirection, SyncOutcome, WidgetEvent,
};
pub use protocol::{AuthorityEvent, ClientEvent, JoinResult, SyncResponse, WireMessage};
pub use queue::TrackQueue;
pub use resolver::{MediaIdResolver, YoutubeIdResolver};
pub use room::RoomClient;
pub use settings::RoomSettings;
pub use sync::{PendingSync, SyncOracle};

#[cfg(feature = "pmoconfig")]
pub use logging::init_logging;
