//! Playback state machine.
//!
//! Owns "what is currently playing and is it playing" for one participant,
//! and is the only component allowed to drive the media widget.
//!
//! States are derived from the fields: `Idle` without a current track,
//! `Loaded` with a paused current track, `Playing` otherwise. Remote
//! `update-current-playing` and `update-playing-status` events are applied
//! independently and idempotently, in whatever order they arrive.
//!
//! Pausing never clears the current track, whatever the role.

use tracing::{debug, info, warn};

use crate::errors::RoomError;
use crate::model::{MediaReference, PlaybackPhase, PlaybackState, PlayerState, SyncSnapshot};
use crate::permissions::{Action, PermissionSet};
use crate::playback::widget::{LoadGeneration, MediaWidget, WidgetEvent};
use crate::protocol::ClientEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipDirection {
    Previous,
    Next,
}

/// What a sync snapshot did to the local player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The authority has no active track; the local player was stopped.
    NoActiveTrack,
    /// The local player was loaded with `media_id` and positioned.
    Applied { media_id: String },
}

pub struct PlaybackMachine {
    widget: Box<dyn MediaWidget>,
    current_track_id: Option<String>,
    current_index: Option<usize>,
    is_playing: bool,
    generation: LoadGeneration,
    /// Track whose media is loaded in the widget, if it came from the queue.
    loaded_track_id: Option<String>,
    last_player_state: PlayerState,
    /// Player state a sync snapshot asked for, keyed by the load it issued.
    sync_intent: Option<(LoadGeneration, PlayerState)>,
    volume: u8,
    auto_advance: bool,
}

impl PlaybackMachine {
    pub fn new(widget: Box<dyn MediaWidget>, volume: u8, auto_advance: bool) -> Self {
        Self {
            widget,
            current_track_id: None,
            current_index: None,
            is_playing: false,
            generation: LoadGeneration::default(),
            loaded_track_id: None,
            last_player_state: PlayerState::Unstarted,
            sync_intent: None,
            volume: volume.min(100),
            auto_advance,
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            current_index: self.current_index,
            current_track_id: self.current_track_id.clone(),
            is_playing: self.is_playing,
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.state().phase()
    }

    pub fn current_track_id(&self) -> Option<&str> {
        self.current_track_id.as_deref()
    }

    pub fn generation(&self) -> LoadGeneration {
        self.generation
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn last_player_state(&self) -> &PlayerState {
        &self.last_player_state
    }

    pub fn widget_ready(&self) -> bool {
        self.widget.is_ready()
    }

    pub fn set_auto_advance(&mut self, enabled: bool) {
        self.auto_advance = enabled;
    }

    /// Makes `id` the current track and starts it.
    ///
    /// Returns `update-current-playing` then `update-playing-status`, to be
    /// sent in that order.
    pub fn select_and_play(
        &mut self,
        id: &str,
        queue: &[MediaReference],
        permissions: &PermissionSet,
    ) -> Result<Vec<ClientEvent>, RoomError> {
        permissions.require(Action::PlayPause)?;
        self.play_track(id, queue)
    }

    /// Pauses when playing, otherwise plays the current track, or the first
    /// queued track when nothing is selected.
    pub fn toggle_pause(
        &mut self,
        queue: &[MediaReference],
        permissions: &PermissionSet,
    ) -> Result<Vec<ClientEvent>, RoomError> {
        permissions.require(Action::PlayPause)?;

        match (self.phase(), self.current_track_id.clone()) {
            (PlaybackPhase::Playing, _) => {
                self.is_playing = false;
                self.drive("pause", |w| w.pause());
                debug!(track_id = ?self.current_track_id, "Paused");
                Ok(vec![ClientEvent::UpdatePlayingStatus { value: false }])
            }
            (_, Some(id)) => self.play_track(&id, queue),
            (_, None) => {
                let first = queue.first().ok_or(RoomError::EmptyQueue)?.id().to_string();
                self.play_track(&first, queue)
            }
        }
    }

    /// Moves to the neighbouring track, wrapping around both ends.
    pub fn skip(
        &mut self,
        direction: SkipDirection,
        queue: &[MediaReference],
        permissions: &PermissionSet,
    ) -> Result<Vec<ClientEvent>, RoomError> {
        permissions.require(Action::PlayPause)?;

        let current = self.current_track_id.as_deref().ok_or(RoomError::NoCurrentTrack)?;
        if queue.is_empty() {
            return Err(RoomError::EmptyQueue);
        }
        let index = queue
            .iter()
            .position(|t| t.id() == current)
            .ok_or(RoomError::NoCurrentTrack)?;

        let len = queue.len();
        let target = match direction {
            SkipDirection::Next => (index + 1) % len,
            SkipDirection::Previous => (index + len - 1) % len,
        };
        let id = queue[target].id().to_string();
        self.play_track(&id, queue)
    }

    fn play_track(&mut self, id: &str, queue: &[MediaReference]) -> Result<Vec<ClientEvent>, RoomError> {
        let index = queue
            .iter()
            .position(|t| t.id() == id)
            .ok_or_else(|| RoomError::UnknownTrack(id.to_string()))?;
        let track = &queue[index];

        self.current_track_id = Some(track.id().to_string());
        self.current_index = Some(index);
        self.is_playing = true;

        if self.loaded_track_id.as_deref() != Some(track.id()) {
            self.load_track(track);
        }
        self.drive("play", |w| w.play());
        info!(track_id = id, index, "Playing track");

        Ok(vec![
            ClientEvent::UpdateCurrentPlaying {
                index,
                track_id: Some(track.id().to_string()),
            },
            ClientEvent::UpdatePlayingStatus { value: true },
        ])
    }

    /// Applies a remote `update-current-playing`.
    ///
    /// An id is resolved by id; an index-only event is resolved against this
    /// participant's own queue. Unresolvable events are dropped. Returns
    /// `true` when the current track changed.
    pub fn apply_remote_current(
        &mut self,
        index: Option<usize>,
        track_id: Option<&str>,
        queue: &[MediaReference],
    ) -> bool {
        let resolved = match track_id {
            Some(id) => queue.iter().position(|t| t.id() == id),
            None => index.filter(|&i| i < queue.len()),
        };
        let Some(resolved) = resolved else {
            warn!(
                index = ?index,
                track_id = ?track_id,
                queue_len = queue.len(),
                "Dropping update-current-playing that does not resolve against local queue"
            );
            return false;
        };

        let track = &queue[resolved];
        self.current_index = Some(resolved);
        if self.current_track_id.as_deref() == Some(track.id())
            && self.loaded_track_id.as_deref() == Some(track.id())
        {
            return false;
        }

        self.current_track_id = Some(track.id().to_string());
        self.load_track(track);
        if self.is_playing {
            self.drive("play", |w| w.play());
        }
        debug!(track_id = track.id(), index = resolved, "Remote current track applied");
        true
    }

    /// Applies a remote `update-playing-status`. Returns `true` on change.
    pub fn apply_remote_status(&mut self, value: bool) -> bool {
        if self.is_playing == value {
            return false;
        }
        self.is_playing = value;
        if self.current_track_id.is_some() {
            if value {
                self.drive("play", |w| w.play());
            } else {
                self.drive("pause", |w| w.pause());
            }
        }
        debug!(value, "Remote playing status applied");
        true
    }

    /// Re-resolves the current index after the queue changed.
    ///
    /// If the current track is gone, playback stops and the machine goes
    /// back to `Idle`. Returns `true` when the playback state changed.
    pub fn resolve_after_queue_change(&mut self, queue: &[MediaReference]) -> bool {
        let Some(id) = self.current_track_id.as_deref() else {
            return false;
        };
        match queue.iter().position(|t| t.id() == id) {
            Some(index) => {
                let changed = self.current_index != Some(index);
                self.current_index = Some(index);
                changed
            }
            None => {
                debug!(track_id = id, "Current track left the queue");
                self.clear_current();
                true
            }
        }
    }

    /// Handles a widget callback. Callbacks from superseded loads are dropped.
    ///
    /// May return events when auto-advance moves to the next track.
    pub fn handle_widget_event(
        &mut self,
        event: WidgetEvent,
        queue: &[MediaReference],
        permissions: &PermissionSet,
    ) -> Result<Vec<ClientEvent>, RoomError> {
        if event.generation() != self.generation {
            debug!(
                stale = event.generation().0,
                current = self.generation.0,
                "Dropping widget callback from superseded load"
            );
            return Ok(Vec::new());
        }

        match event {
            WidgetEvent::Ready { generation } => {
                let volume = self.volume;
                self.drive("set_volume", |w| w.set_volume(volume));
                match self.sync_intent.take() {
                    Some((loaded, state)) if loaded == generation => self.apply_player_state(&state),
                    _ => {
                        if self.is_playing && self.current_track_id.is_some() {
                            self.drive("play", |w| w.play());
                        }
                    }
                }
                Ok(Vec::new())
            }
            WidgetEvent::StateChange { state, .. } => {
                let ended = state == PlayerState::Ended;
                self.last_player_state = state;
                if ended
                    && self.auto_advance
                    && self.current_track_id.is_some()
                    && permissions.allows(Action::PlayPause)
                {
                    debug!("Track ended, advancing");
                    return self.skip(SkipDirection::Next, queue, permissions);
                }
                Ok(Vec::new())
            }
        }
    }

    /// Reconciles the local player with an authoritative snapshot.
    ///
    /// The participant's `PlaybackState` is left untouched.
    pub fn apply_sync(&mut self, snapshot: &SyncSnapshot, queue: &[MediaReference]) -> SyncOutcome {
        let Some(media_id) = snapshot.media_id.as_deref() else {
            self.generation = self.generation.next();
            self.loaded_track_id = None;
            self.sync_intent = None;
            self.drive("stop", |w| w.stop());
            return SyncOutcome::NoActiveTrack;
        };

        self.load_media(media_id, Some(snapshot.position_seconds));
        self.loaded_track_id = self.current_track_id.clone().filter(|id| {
            queue
                .iter()
                .any(|t| t.id() == id.as_str() && t.media_id() == media_id)
        });

        self.apply_player_state(&snapshot.player_state);
        self.sync_intent = Some((self.generation, snapshot.player_state.clone()));
        debug!(
            media_id,
            position = snapshot.position_seconds,
            state = snapshot.player_state.as_str(),
            "Sync snapshot applied"
        );
        SyncOutcome::Applied {
            media_id: media_id.to_string(),
        }
    }

    /// Sets the local volume, clamped to 100.
    pub fn set_volume(&mut self, percent: u8, permissions: &PermissionSet) -> Result<u8, RoomError> {
        permissions.require(Action::ControlVolume)?;
        let percent = percent.min(100);
        self.volume = percent;
        self.drive("set_volume", |w| w.set_volume(percent));
        Ok(percent)
    }

    /// Stops the widget and forgets everything. Used when leaving the room.
    pub fn teardown(&mut self) {
        self.clear_current();
        self.last_player_state = PlayerState::Unstarted;
    }

    /// Tears down and restores the initial volume before entering another
    /// room. Load generations keep counting so late callbacks stay stale.
    pub fn reset(&mut self, volume: u8) {
        self.teardown();
        self.volume = volume.min(100);
    }

    fn apply_player_state(&mut self, state: &PlayerState) {
        match state {
            PlayerState::Playing => self.drive("play", |w| w.play()),
            PlayerState::Paused | PlayerState::Cued => self.drive("pause", |w| w.pause()),
            _ => {}
        }
    }

    fn clear_current(&mut self) {
        self.current_track_id = None;
        self.current_index = None;
        self.is_playing = false;
        self.loaded_track_id = None;
        self.sync_intent = None;
        self.generation = self.generation.next();
        self.drive("stop", |w| w.stop());
    }

    fn load_track(&mut self, track: &MediaReference) {
        self.load_media(track.media_id(), None);
        self.loaded_track_id = Some(track.id().to_string());
    }

    fn load_media(&mut self, media_id: &str, start_seconds: Option<f64>) {
        self.generation = self.generation.next();
        self.sync_intent = None;
        let generation = self.generation;
        debug!(media_id, generation = generation.0, "Loading media");
        self.drive("load", |w| w.load(media_id, start_seconds, generation));
    }

    fn drive<F>(&mut self, command: &'static str, f: F)
    where
        F: FnOnce(&mut dyn MediaWidget) -> anyhow::Result<()>,
    {
        if let Err(err) = f(self.widget.as_mut()) {
            warn!(command, error = %err, "Media widget command failed");
        }
    }
}
