//! Session channel message catalog.
//!
//! Every message travels as a `WireMessage`: an event name plus a JSON
//! payload. `ClientEvent` covers what a participant proposes to the
//! authority, `AuthorityEvent` what the authority pushes back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RoomError;
use crate::model::{MediaReference, PlayerState, SyncSnapshot};
use crate::permissions::PermissionSet;

pub const CREATE_ROOM: &str = "create-room";
pub const JOIN_ROOM: &str = "join-room";
pub const ROOM_TRACKS: &str = "room-tracks";
pub const ADD_TRACK: &str = "add-track";
pub const UPDATE_TRACKS: &str = "update-tracks";
pub const UPDATE_CURRENT_PLAYING: &str = "update-current-playing";
pub const UPDATE_PLAYING_STATUS: &str = "update-playing-status";
pub const UPDATE_VOLUME: &str = "update-volume";
pub const SYNC_REQUEST: &str = "sync-request";
pub const SYNC_RESPONSE: &str = "sync-response";
pub const CLEAR_STATE: &str = "clear-state";

const ERROR_TYPE: &str = "ERROR";

/// One frame on the session channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl WireMessage {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Proposals and announcements sent by a participant.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    CreateRoom {
        room_id: String,
    },
    JoinRoom {
        room_id: String,
    },
    AddTrack {
        tracks: Vec<MediaReference>,
    },
    /// Full-queue replacement (delete, clear, reorder).
    UpdateTracks {
        tracks: Vec<MediaReference>,
        base_version: Option<u64>,
    },
    UpdateCurrentPlaying {
        index: usize,
        track_id: Option<String>,
    },
    UpdatePlayingStatus {
        value: bool,
    },
    UpdateVolume {
        percent: u8,
    },
    SyncRequest,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomPayload<'a> {
    room_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TracksPayload<'a> {
    tracks: &'a [MediaReference],
    #[serde(skip_serializing_if = "Option::is_none")]
    base_version: Option<u64>,
}

#[derive(Serialize, Deserialize)]
struct CurrentPlayingPayload {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct PlayingStatusPayload {
    value: bool,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::CreateRoom { .. } => CREATE_ROOM,
            ClientEvent::JoinRoom { .. } => JOIN_ROOM,
            ClientEvent::AddTrack { .. } => ADD_TRACK,
            ClientEvent::UpdateTracks { .. } => UPDATE_TRACKS,
            ClientEvent::UpdateCurrentPlaying { .. } => UPDATE_CURRENT_PLAYING,
            ClientEvent::UpdatePlayingStatus { .. } => UPDATE_PLAYING_STATUS,
            ClientEvent::UpdateVolume { .. } => UPDATE_VOLUME,
            ClientEvent::SyncRequest => SYNC_REQUEST,
        }
    }

    pub fn to_wire(&self) -> Result<WireMessage, RoomError> {
        let payload = match self {
            ClientEvent::CreateRoom { room_id } => {
                serde_json::to_value(CreateRoomPayload { room_id })
            }
            ClientEvent::JoinRoom { room_id } => Ok(Value::String(room_id.clone())),
            ClientEvent::AddTrack { tracks } => serde_json::to_value(TracksPayload {
                tracks,
                base_version: None,
            }),
            ClientEvent::UpdateTracks {
                tracks,
                base_version,
            } => serde_json::to_value(TracksPayload {
                tracks,
                base_version: *base_version,
            }),
            ClientEvent::UpdateCurrentPlaying { index, track_id } => {
                serde_json::to_value(CurrentPlayingPayload {
                    index: Some(*index),
                    id: track_id.clone(),
                })
            }
            ClientEvent::UpdatePlayingStatus { value } => {
                serde_json::to_value(PlayingStatusPayload { value: *value })
            }
            ClientEvent::UpdateVolume { percent } => Ok(Value::from(*percent)),
            ClientEvent::SyncRequest => Ok(Value::Null),
        }
        .map_err(|e| RoomError::protocol(format!("cannot encode {}: {}", self.name(), e)))?;

        Ok(WireMessage::new(self.name(), payload))
    }
}

/// Outcome of a `join-room` request.
#[derive(Clone, Debug, PartialEq)]
pub enum JoinResult {
    Accepted(PermissionSet),
    Rejected,
}

/// Answer to a `sync-request`.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncResponse {
    Time(SyncSnapshot),
    Error,
}

/// Events pushed by the session authority.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthorityEvent {
    JoinRoom(JoinResult),
    RoomTracks {
        tracks: Vec<MediaReference>,
        version: Option<u64>,
    },
    /// Current track announcement. At least one of `index` and `track_id`
    /// is set. When `track_id` is present it alone decides the track.
    UpdateCurrentPlaying {
        index: Option<usize>,
        track_id: Option<String>,
    },
    UpdatePlayingStatus {
        value: bool,
    },
    SyncResponse(SyncResponse),
    ClearState,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomReply {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    allow_member_control_volume: bool,
    #[serde(default)]
    allow_member_to_play: bool,
    #[serde(default)]
    allow_member_to_sync: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoomTracksPayload {
    Bare(Vec<MediaReference>),
    Versioned {
        tracks: Vec<MediaReference>,
        #[serde(default)]
        version: Option<u64>,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum SyncReply {
    #[serde(rename = "TIME")]
    Time {
        #[serde(rename = "videoId", default)]
        video_id: Option<String>,
        #[serde(rename = "currentTime", default)]
        current_time: f64,
        #[serde(rename = "playerState", default = "unstarted")]
        player_state: PlayerState,
    },
    #[serde(rename = "ERROR")]
    Error,
}

fn unstarted() -> PlayerState {
    PlayerState::Unstarted
}

fn decode<T: serde::de::DeserializeOwned>(event: &str, payload: &Value) -> Result<T, RoomError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| RoomError::protocol(format!("malformed {} payload: {}", event, e)))
}

impl AuthorityEvent {
    pub fn from_wire(message: &WireMessage) -> Result<Self, RoomError> {
        let event = message.event.as_str();
        let payload = &message.payload;

        match event {
            JOIN_ROOM => {
                let reply: JoinRoomReply = decode(event, payload)?;
                if reply.kind.as_deref() == Some(ERROR_TYPE) {
                    Ok(AuthorityEvent::JoinRoom(JoinResult::Rejected))
                } else {
                    Ok(AuthorityEvent::JoinRoom(JoinResult::Accepted(PermissionSet {
                        can_control_volume: reply.allow_member_control_volume,
                        can_play: reply.allow_member_to_play,
                        can_sync: reply.allow_member_to_sync,
                    })))
                }
            }
            ROOM_TRACKS => {
                let (tracks, version) = match decode::<RoomTracksPayload>(event, payload)? {
                    RoomTracksPayload::Bare(tracks) => (tracks, None),
                    RoomTracksPayload::Versioned { tracks, version } => (tracks, version),
                };
                Ok(AuthorityEvent::RoomTracks { tracks, version })
            }
            UPDATE_CURRENT_PLAYING => {
                let p: CurrentPlayingPayload = decode(event, payload)?;
                if p.index.is_none() && p.id.is_none() {
                    return Err(RoomError::protocol(
                        "update-current-playing carries neither index nor id",
                    ));
                }
                Ok(AuthorityEvent::UpdateCurrentPlaying {
                    index: p.index,
                    track_id: p.id,
                })
            }
            UPDATE_PLAYING_STATUS => {
                let p: PlayingStatusPayload = decode(event, payload)?;
                Ok(AuthorityEvent::UpdatePlayingStatus { value: p.value })
            }
            SYNC_RESPONSE => {
                let response = match decode::<SyncReply>(event, payload)? {
                    SyncReply::Time {
                        video_id,
                        current_time,
                        player_state,
                    } => SyncResponse::Time(SyncSnapshot {
                        media_id: video_id.filter(|id| !id.is_empty()),
                        position_seconds: current_time.max(0.0),
                        player_state,
                    }),
                    SyncReply::Error => SyncResponse::Error,
                };
                Ok(AuthorityEvent::SyncResponse(response))
            }
            CLEAR_STATE => Ok(AuthorityEvent::ClearState),
            other => Err(RoomError::protocol(format!("unknown event '{}'", other))),
        }
    }
}
