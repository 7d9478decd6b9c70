//! Room client: one participant's view of a shared playback room.
//!
//! `RoomClient` wires the queue reconciler, the playback machine, the sync
//! oracle and the permission gate to a `SessionChannel`. It is a cheap
//! handle around shared state: clone it into the task pumping inbound
//! events and keep another copy for UI actions.
//!
//! Every local action applies its optimistic change first and only then
//! emits on the channel. Inbound authoritative events go through
//! `handle_event`. A failed send is fatal to the membership.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use crate::channel::SessionChannel;
use crate::errors::RoomError;
use crate::events::{NoticeLevel, RoomEvent, RoomEventBus};
use crate::lifecycle::{SessionLifecycle, SessionLost, SessionState};
use crate::model::{MediaReference, PlaybackState, Role, SyncSnapshot};
use crate::permissions::{Action, PermissionSet, refusal_message};
use crate::playback::{MediaWidget, PlaybackMachine, SkipDirection, SyncOutcome, WidgetEvent};
use crate::protocol::{AuthorityEvent, ClientEvent, JoinResult};
use crate::queue::TrackQueue;
use crate::resolver::{MediaIdResolver, YoutubeIdResolver};
use crate::settings::RoomSettings;
use crate::sync::SyncOracle;

const JOINED_MESSAGE: &str = "Joined the room";
const ROOM_NOT_FOUND_MESSAGE: &str = "Room not found";
const HOST_LEFT_MESSAGE: &str = "Host has left the room";
const TRACK_ADDED_MESSAGE: &str = "Track added";
const NO_ACTIVE_TRACK_MESSAGE: &str = "No track is currently playing";

struct RoomInner {
    role: Option<Role>,
    permissions: PermissionSet,
    queue: TrackQueue,
    playback: PlaybackMachine,
    sync: SyncOracle,
    channel: Box<dyn SessionChannel>,
    lifecycle: SessionLifecycle,
    settings: RoomSettings,
}

#[derive(Clone)]
pub struct RoomClient {
    inner: Arc<Mutex<RoomInner>>,
    events: RoomEventBus,
}

impl RoomClient {
    pub fn new<C, W>(settings: RoomSettings, channel: C, widget: W) -> Self
    where
        C: SessionChannel + 'static,
        W: MediaWidget + 'static,
    {
        Self::with_resolver(settings, channel, widget, YoutubeIdResolver)
    }

    pub fn with_resolver<C, W, R>(settings: RoomSettings, channel: C, widget: W, resolver: R) -> Self
    where
        C: SessionChannel + 'static,
        W: MediaWidget + 'static,
        R: MediaIdResolver + 'static,
    {
        let inner = RoomInner {
            role: None,
            permissions: PermissionSet::default(),
            queue: TrackQueue::new(
                Box::new(resolver),
                settings.client_id.as_deref().unwrap_or_default(),
            ),
            playback: PlaybackMachine::new(Box::new(widget), settings.initial_volume, false),
            sync: SyncOracle::new(settings.sync_timeout),
            channel: Box::new(channel),
            lifecycle: SessionLifecycle::new(),
            settings,
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            events: RoomEventBus::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- Membership ----

    /// Creates `room_id` and enters it as host, with every capability.
    pub fn create_room(&self, room_id: &str) -> Result<(), RoomError> {
        let room_id = validate_room_id(room_id)?;
        let mut guard = self.lock();
        let inner = &mut *guard;

        inner.lifecycle.begin_join(&room_id)?;
        inner.role = Some(Role::Host);
        inner.permissions = PermissionSet::host();
        inner.playback.set_auto_advance(inner.settings.auto_advance);
        inner.lifecycle.activate();
        self.events.broadcast(RoomEvent::Joined {
            room_id: room_id.clone(),
            role: Role::Host,
            permissions: inner.permissions,
        });

        self.send(inner, vec![ClientEvent::CreateRoom { room_id }])
    }

    /// Asks to join `room_id` as a member. The room becomes active when the
    /// authority's `join-room` reply arrives through `handle_event`.
    pub fn join_room(&self, room_id: &str) -> Result<(), RoomError> {
        let room_id = validate_room_id(room_id)?;
        let mut guard = self.lock();
        let inner = &mut *guard;

        inner.lifecycle.begin_join(&room_id)?;
        inner.role = Some(Role::Member);
        inner.permissions = PermissionSet::default();
        inner.playback.set_auto_advance(false);
        debug!(room = room_id.as_str(), "Joining room");

        self.send(inner, vec![ClientEvent::JoinRoom { room_id }])
    }

    /// Leaves the room without notifying `on_session_lost` listeners.
    ///
    /// The handle may then create or join another room, starting from an
    /// empty queue.
    pub fn leave(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        info!(room = ?inner.lifecycle.room_id(), "Leaving room");
        inner.lifecycle.leave();
        Self::reset_membership(inner);
    }

    fn reset_membership(inner: &mut RoomInner) {
        inner.role = None;
        inner.permissions = PermissionSet::default();
        inner.queue.reset();
        inner.playback.reset(inner.settings.initial_volume);
        inner.sync.cancel();
    }

    /// Declares the session lost. Only the first call has an effect.
    pub fn session_lost(&self, reason: &str) {
        let mut guard = self.lock();
        self.lose(&mut guard, reason);
    }

    fn lose(&self, inner: &mut RoomInner, reason: &str) {
        if !inner.lifecycle.mark_lost(reason) {
            return;
        }
        inner.playback.teardown();
        inner.sync.cancel();
        self.events.broadcast(RoomEvent::SessionLost {
            reason: reason.to_string(),
        });
        self.events.broadcast(RoomEvent::notice(NoticeLevel::Error, reason));
    }

    // ---- Inbound ----

    /// Applies one event pushed by the session authority.
    pub fn handle_event(&self, event: AuthorityEvent) -> Result<(), RoomError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if !matches!(
            inner.lifecycle.state(),
            SessionState::Joining { .. } | SessionState::Active { .. }
        ) {
            debug!(state = ?inner.lifecycle.state(), "Ignoring authority event outside a room");
            return Ok(());
        }

        match event {
            AuthorityEvent::JoinRoom(result) => self.apply_join_result(inner, result),
            AuthorityEvent::RoomTracks { tracks, version } => {
                if inner.queue.set_authoritative(tracks, version) {
                    let playback_changed = inner.playback.resolve_after_queue_change(inner.queue.local());
                    self.publish_queue(inner);
                    if playback_changed {
                        self.publish_playback(inner);
                    }
                }
                Ok(())
            }
            AuthorityEvent::UpdateCurrentPlaying { index, track_id } => {
                if inner
                    .playback
                    .apply_remote_current(index, track_id.as_deref(), inner.queue.local())
                {
                    self.publish_playback(inner);
                }
                Ok(())
            }
            AuthorityEvent::UpdatePlayingStatus { value } => {
                if inner.playback.apply_remote_status(value) {
                    self.publish_playback(inner);
                }
                Ok(())
            }
            AuthorityEvent::SyncResponse(response) => {
                inner.sync.deliver(response);
                Ok(())
            }
            AuthorityEvent::ClearState => {
                self.lose(inner, HOST_LEFT_MESSAGE);
                Ok(())
            }
        }
    }

    fn apply_join_result(&self, inner: &mut RoomInner, result: JoinResult) -> Result<(), RoomError> {
        if inner.lifecycle.is_active() {
            warn!(room = ?inner.lifecycle.room_id(), "Ignoring join-room reply, permissions are already set");
            return Ok(());
        }

        match result {
            JoinResult::Accepted(permissions) => {
                inner.permissions = permissions;
                if let Some(room_id) = inner.lifecycle.activate() {
                    self.events.broadcast(RoomEvent::Joined {
                        room_id,
                        role: inner.role.unwrap_or(Role::Member),
                        permissions,
                    });
                    self.events
                        .broadcast(RoomEvent::notice(NoticeLevel::Success, JOINED_MESSAGE));
                }
                Ok(())
            }
            JoinResult::Rejected => {
                let room_id = inner.lifecycle.reject().unwrap_or_default();
                Self::reset_membership(inner);
                warn!(room = room_id.as_str(), "Join rejected");
                self.events
                    .broadcast(RoomEvent::notice(NoticeLevel::Error, ROOM_NOT_FOUND_MESSAGE));
                Err(RoomError::RoomNotFound(room_id))
            }
        }
    }

    /// Forwards a media widget callback to the playback machine.
    pub fn handle_widget_event(&self, event: WidgetEvent) -> Result<(), RoomError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if !inner.lifecycle.is_active() {
            return Ok(());
        }

        let before = inner.playback.state();
        let outgoing = inner
            .playback
            .handle_widget_event(event, inner.queue.local(), &inner.permissions)?;
        if inner.playback.state() != before {
            self.publish_playback(inner);
        }
        self.send(inner, outgoing)
    }

    // ---- Queue ----

    /// Proposes a new track from a user supplied URL.
    ///
    /// The track shows up in `display_queue` right away and stays pending
    /// until the authority pushes the queue back.
    pub fn add_track(&self, url: &str, title: Option<&str>) -> Result<MediaReference, RoomError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.lifecycle.ensure_active()?;

        let (track, event) = match inner.queue.add_track(url, title) {
            Ok(added) => added,
            Err(err) => {
                self.refuse(&err);
                return Err(err);
            }
        };
        self.publish_queue(inner);
        self.send(inner, vec![event])?;
        self.events
            .broadcast(RoomEvent::notice(NoticeLevel::Success, TRACK_ADDED_MESSAGE));
        Ok(track)
    }

    pub fn begin_reorder(&self) -> Result<(), RoomError> {
        let mut guard = self.lock();
        guard.lifecycle.ensure_active()?;
        guard.queue.begin_reorder();
        Ok(())
    }

    /// Applies an intermediate drag order locally. Nothing is sent.
    pub fn reorder_locally<I, S>(&self, order: I) -> Result<(), RoomError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.lifecycle.ensure_active()?;
        inner.queue.reorder_locally(order)?;
        self.after_local_queue_change(inner);
        Ok(())
    }

    /// Ends the drag and proposes the final order with one `update-tracks`.
    pub fn end_reorder(&self) -> Result<(), RoomError> {
        self.queue_edit(|queue| queue.end_reorder())
    }

    pub fn cancel_reorder(&self) -> Result<(), RoomError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.lifecycle.ensure_active()?;
        inner.queue.cancel_reorder();
        self.after_local_queue_change(inner);
        Ok(())
    }

    pub fn delete_track(&self, id: &str) -> Result<(), RoomError> {
        self.queue_edit(|queue| queue.delete_track(id))
    }

    pub fn clear_all(&self) -> Result<(), RoomError> {
        self.queue_edit(|queue| Ok(queue.clear_all()))
    }

    fn queue_edit<F>(&self, edit: F) -> Result<(), RoomError>
    where
        F: FnOnce(&mut TrackQueue) -> Result<ClientEvent, RoomError>,
    {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.lifecycle.ensure_active()?;
        let event = edit(&mut inner.queue)?;
        self.after_local_queue_change(inner);
        self.send(inner, vec![event])
    }

    fn after_local_queue_change(&self, inner: &mut RoomInner) {
        let playback_changed = inner.playback.resolve_after_queue_change(inner.queue.local());
        self.publish_queue(inner);
        if playback_changed {
            self.publish_playback(inner);
        }
    }

    // ---- Playback ----

    pub fn select_and_play(&self, id: &str) -> Result<(), RoomError> {
        self.playback_action(|inner| {
            inner
                .playback
                .select_and_play(id, inner.queue.local(), &inner.permissions)
        })
    }

    pub fn toggle_pause(&self) -> Result<(), RoomError> {
        self.playback_action(|inner| inner.playback.toggle_pause(inner.queue.local(), &inner.permissions))
    }

    pub fn skip(&self, direction: SkipDirection) -> Result<(), RoomError> {
        self.playback_action(|inner| {
            inner
                .playback
                .skip(direction, inner.queue.local(), &inner.permissions)
        })
    }

    fn playback_action<F>(&self, action: F) -> Result<(), RoomError>
    where
        F: FnOnce(&mut RoomInner) -> Result<Vec<ClientEvent>, RoomError>,
    {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.lifecycle.ensure_active()?;

        let before = inner.playback.state();
        let outgoing = match action(inner) {
            Ok(outgoing) => outgoing,
            Err(err) => {
                self.refuse(&err);
                return Err(err);
            }
        };
        if inner.playback.state() != before {
            self.publish_playback(inner);
        }
        self.send(inner, outgoing)
    }

    /// Sets the local volume. The host also broadcasts it to the room.
    pub fn set_volume(&self, percent: u8) -> Result<u8, RoomError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.lifecycle.ensure_active()?;

        let percent = match inner.playback.set_volume(percent, &inner.permissions) {
            Ok(percent) => percent,
            Err(err) => {
                self.refuse(&err);
                return Err(err);
            }
        };
        if inner.role == Some(Role::Host) {
            self.send(inner, vec![ClientEvent::UpdateVolume { percent }])?;
        }
        Ok(percent)
    }

    /// Asks the authority where playback is and moves the local player
    /// there.
    ///
    /// The participant's `PlaybackState` is not modified. Safe to retry.
    pub async fn request_sync(&self) -> Result<SyncSnapshot, RoomError> {
        let pending = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            inner.lifecycle.ensure_active()?;
            if let Err(err) = inner.permissions.require(Action::Sync) {
                self.refuse(&err);
                return Err(err);
            }
            if !inner.playback.widget_ready() {
                let err = RoomError::sync_unavailable("media player is not ready");
                self.refuse(&err);
                return Err(err);
            }
            let pending = inner.sync.begin();
            self.send(inner, vec![ClientEvent::SyncRequest])?;
            pending
        };

        let snapshot = match pending.wait().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.refuse(&err);
                return Err(err);
            }
        };

        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.lifecycle.ensure_active()?;
        match inner.playback.apply_sync(&snapshot, inner.queue.local()) {
            SyncOutcome::NoActiveTrack => {
                self.events
                    .broadcast(RoomEvent::notice(NoticeLevel::Info, NO_ACTIVE_TRACK_MESSAGE));
            }
            SyncOutcome::Applied { media_id } => {
                debug!(media_id = media_id.as_str(), "Local player synced");
            }
        }
        Ok(snapshot)
    }

    // ---- Views ----

    pub fn local_queue(&self) -> Vec<MediaReference> {
        self.lock().queue.local().to_vec()
    }

    pub fn authoritative_queue(&self) -> Vec<MediaReference> {
        self.lock().queue.authoritative().to_vec()
    }

    /// Local queue followed by tracks still awaiting confirmation.
    pub fn display_queue(&self) -> Vec<MediaReference> {
        self.lock().queue.display_queue()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.lock().playback.state()
    }

    pub fn permissions(&self) -> PermissionSet {
        self.lock().permissions
    }

    pub fn role(&self) -> Option<Role> {
        self.lock().role
    }

    pub fn room_id(&self) -> Option<String> {
        self.lock().lifecycle.room_id().map(str::to_string)
    }

    pub fn session_state(&self) -> SessionState {
        self.lock().lifecycle.state().clone()
    }

    pub fn is_active(&self) -> bool {
        self.lock().lifecycle.is_active()
    }

    /// True once the room was left or lost.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.lock().lifecycle.state(),
            SessionState::Lost { .. } | SessionState::Left
        )
    }

    pub fn volume(&self) -> u8 {
        self.lock().playback.volume()
    }

    /// Link to the source of the current track, for sharing.
    pub fn current_share_url(&self) -> Option<String> {
        let guard = self.lock();
        let id = guard.playback.current_track_id()?;
        guard
            .queue
            .local()
            .iter()
            .find(|t| t.id() == id)
            .map(|t| t.source_url().to_string())
    }

    pub fn subscribe(&self) -> Receiver<RoomEvent> {
        self.events.subscribe()
    }

    pub fn on_session_lost(&self) -> Receiver<SessionLost> {
        self.lock().lifecycle.on_session_lost()
    }

    // ---- Helpers ----

    /// Sends `outgoing` in order. The first failure stops the batch; a
    /// fatal one ends the session.
    fn send(&self, inner: &mut RoomInner, outgoing: Vec<ClientEvent>) -> Result<(), RoomError> {
        for event in outgoing {
            if let Err(err) = inner.channel.send(&event) {
                warn!(event = event.name(), error = %err, "Failed to send session event");
                if let RoomError::SessionLost(reason) = &err {
                    self.lose(inner, reason);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn refuse(&self, err: &RoomError) {
        let message = match err {
            RoomError::PermissionDenied(action) => refusal_message(*action).to_string(),
            RoomError::InvalidReference(_) | RoomError::SyncUnavailable(_) => err.to_string(),
            _ => return,
        };
        self.events.broadcast(RoomEvent::notice(NoticeLevel::Error, message));
    }

    fn publish_queue(&self, inner: &RoomInner) {
        self.events.broadcast(RoomEvent::QueueChanged {
            tracks: inner.queue.display_queue(),
        });
    }

    fn publish_playback(&self, inner: &RoomInner) {
        self.events
            .broadcast(RoomEvent::PlaybackChanged(inner.playback.state()));
    }
}

fn validate_room_id(room_id: &str) -> Result<String, RoomError> {
    let trimmed = room_id.trim();
    if trimmed.is_empty() {
        return Err(RoomError::InvalidRoomId(room_id.to_string()));
    }
    Ok(trimmed.to_string())
}
