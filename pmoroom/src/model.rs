use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// A queued, addressable pointer to externally hosted video content.
///
/// Immutable once created: only queue membership changes. The serde
/// representation is the `Track` wire shape `{id, title, url, videoId}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    id: String,
    title: String,
    #[serde(rename = "url")]
    source_url: String,
    #[serde(rename = "videoId")]
    media_id: String,
}

impl MediaReference {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source_url: impl Into<String>,
        media_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source_url: source_url.into(),
            media_id: media_id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    /// Title used when the participant did not provide one.
    pub fn default_title(media_id: &str) -> String {
        format!("Video ({})", media_id)
    }
}

/// Generates client-side track ids from millisecond timestamps.
///
/// An id is `<millis>-<salt>`, where the salt comes from the client id so
/// two participants adding in the same millisecond never collide. The
/// timestamp part is strictly increasing within one generator.
#[derive(Debug)]
pub struct TrackIdGenerator {
    last: i64,
    salt: String,
}

impl TrackIdGenerator {
    const SALT_LEN: usize = 8;

    pub fn new(client_id: &str) -> Self {
        let salt: String = client_id
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(Self::SALT_LEN)
            .collect::<String>()
            .to_ascii_lowercase();
        if salt.is_empty() {
            return Self::default();
        }
        Self { last: 0, salt }
    }

    pub fn next_id(&mut self) -> String {
        let now = Utc::now().timestamp_millis();
        self.last = now.max(self.last + 1);
        format!("{}-{}", self.last, self.salt)
    }
}

impl Default for TrackIdGenerator {
    /// Salted with a fresh random client id.
    fn default() -> Self {
        Self::new(&Uuid::new_v4().simple().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Host,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Member => "member",
        }
    }
}

/// State reported by the external media widget, and by the authority in
/// sync snapshots.
///
/// On the wire it may arrive either as the embedded player's numeric code
/// (`-1`, `0`, `1`, `2`, `3`, `5`) or as its upper-case name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
    /// Anything the widget reports that has no mapping.
    Unknown(String),
}

impl PlayerState {
    pub fn from_code(code: i64) -> Self {
        match code {
            -1 => PlayerState::Unstarted,
            0 => PlayerState::Ended,
            1 => PlayerState::Playing,
            2 => PlayerState::Paused,
            3 => PlayerState::Buffering,
            5 => PlayerState::Cued,
            other => PlayerState::Unknown(other.to_string()),
        }
    }

    pub fn from_name(raw: &str) -> Self {
        let s = raw.trim().to_ascii_uppercase();
        match s.as_str() {
            "UNSTARTED" => PlayerState::Unstarted,
            "ENDED" => PlayerState::Ended,
            "PLAYING" => PlayerState::Playing,
            "PAUSED" => PlayerState::Paused,
            "BUFFERING" => PlayerState::Buffering,
            "CUED" | "VIDEO_CUED" => PlayerState::Cued,
            _ => PlayerState::Unknown(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlayerState::Unstarted => "UNSTARTED",
            PlayerState::Ended => "ENDED",
            PlayerState::Playing => "PLAYING",
            PlayerState::Paused => "PAUSED",
            PlayerState::Buffering => "BUFFERING",
            PlayerState::Cued => "CUED",
            PlayerState::Unknown(s) => s.as_str(),
        }
    }
}

impl Serialize for PlayerState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PlayerState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Code(code) => PlayerState::from_code(code),
            Raw::Name(name) => PlayerState::from_name(&name),
        })
    }
}

/// Coarse state of the playback machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// No current track.
    Idle,
    /// A current track is set and paused.
    Loaded,
    /// A current track is set and advancing.
    Playing,
}

/// What is currently playing, as seen by one participant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub current_index: Option<usize>,
    pub current_track_id: Option<String>,
    pub is_playing: bool,
}

impl PlaybackState {
    pub fn phase(&self) -> PlaybackPhase {
        match (&self.current_track_id, self.is_playing) {
            (None, _) => PlaybackPhase::Idle,
            (Some(_), false) => PlaybackPhase::Loaded,
            (Some(_), true) => PlaybackPhase::Playing,
        }
    }
}

/// Authoritative playback snapshot returned for a sync request.
/// Consumed once and discarded.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncSnapshot {
    pub media_id: Option<String>,
    pub position_seconds: f64,
    pub player_state: PlayerState,
}
