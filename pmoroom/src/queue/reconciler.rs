//! Track queue reconciler.
//!
//! The reconciler keeps two projections of the room queue:
//!   - the *authoritative* queue, last pushed by the session authority,
//!   - the *local* queue, shown to the participant, which may diverge
//!     while a drag reorder is in flight.
//!
//! Local edits never invent or drop ids on their own: every edit is
//! expressed as a complete replacement list sent to the authority, and
//! only the authority's next push changes the id-set for good. Two
//! concurrent edits from different participants are not merged: the
//! last push received by the authority wins.
//!
//! The reconciler never talks to the session channel itself. Operations
//! that need to reach the authority return the `ClientEvent` to send, after
//! local state has already been updated.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::errors::RoomError;
use crate::model::{MediaReference, TrackIdGenerator};
use crate::protocol::ClientEvent;
use crate::resolver::MediaIdResolver;

pub struct TrackQueue {
    authoritative: Vec<MediaReference>,
    local: Vec<MediaReference>,
    /// Tracks proposed by this client and not yet confirmed by a push.
    pending: Vec<MediaReference>,
    reorder_active: bool,
    /// Last version supplied by the authority, if it versions its pushes.
    version: Option<u64>,
    resolver: Box<dyn MediaIdResolver>,
    ids: TrackIdGenerator,
}

impl TrackQueue {
    /// `client_id` salts the ids of tracks proposed from this queue.
    pub fn new(resolver: Box<dyn MediaIdResolver>, client_id: &str) -> Self {
        Self {
            authoritative: Vec::new(),
            local: Vec::new(),
            pending: Vec::new(),
            reorder_active: false,
            version: None,
            resolver,
            ids: TrackIdGenerator::new(client_id),
        }
    }

    /// Forgets everything learned from the previous room, including the
    /// last authoritative version.
    pub fn reset(&mut self) {
        self.authoritative.clear();
        self.local.clear();
        self.pending.clear();
        self.reorder_active = false;
        self.version = None;
    }

    pub fn authoritative(&self) -> &[MediaReference] {
        &self.authoritative
    }

    pub fn local(&self) -> &[MediaReference] {
        &self.local
    }

    pub fn pending(&self) -> &[MediaReference] {
        &self.pending
    }

    /// Local queue followed by optimistically added tracks.
    pub fn display_queue(&self) -> Vec<MediaReference> {
        let mut items = self.local.clone();
        items.extend(self.pending.iter().cloned());
        items
    }

    pub fn is_reordering(&self) -> bool {
        self.reorder_active
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.local.iter().position(|t| t.id() == id)
    }

    pub fn get(&self, index: usize) -> Option<&MediaReference> {
        self.local.get(index)
    }

    /// Replaces the authoritative queue with a push from the authority.
    ///
    /// The local queue follows unless a drag is in progress. Duplicate ids
    /// in the push keep their first occurrence. Returns `false` when the
    /// push was ignored because it is older than the last seen version.
    pub fn set_authoritative(&mut self, tracks: Vec<MediaReference>, version: Option<u64>) -> bool {
        if let (Some(incoming), Some(known)) = (version, self.version) {
            if incoming < known {
                warn!(incoming, known, "Ignoring stale room-tracks push");
                return false;
            }
        }

        let tracks = dedup_by_id(tracks);
        debug!(
            len = tracks.len(),
            version = ?version,
            reordering = self.reorder_active,
            "Applying authoritative queue"
        );

        if version.is_some() {
            self.version = version;
        }
        self.pending.clear();
        if !self.reorder_active {
            self.local = tracks.clone();
        }
        self.authoritative = tracks;
        true
    }

    /// Resolves `url` and builds a new track proposal.
    ///
    /// Nothing is mutated when resolution fails. On success the track is
    /// only held as pending: the authority's next push decides membership.
    pub fn add_track(
        &mut self,
        url: &str,
        title: Option<&str>,
    ) -> Result<(MediaReference, ClientEvent), RoomError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RoomError::InvalidReference("empty URL".to_string()));
        }
        let media_id = self
            .resolver
            .resolve(url)
            .ok_or_else(|| RoomError::InvalidReference(url.to_string()))?;

        let title = match title.map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => MediaReference::default_title(&media_id),
        };
        let track = MediaReference::new(self.ids.next_id(), title, url, media_id);
        debug!(track_id = track.id(), media_id = track.media_id(), "Proposing new track");

        self.pending.push(track.clone());
        let event = ClientEvent::AddTrack {
            tracks: vec![track.clone()],
        };
        Ok((track, event))
    }

    /// Marks a drag as active. Authoritative pushes stop overwriting the
    /// local queue until `end_reorder` or `cancel_reorder`.
    pub fn begin_reorder(&mut self) {
        if !self.reorder_active {
            debug!("Reorder started");
            self.reorder_active = true;
        }
    }

    /// Applies an intermediate drag order to the local queue only.
    ///
    /// `order` must be a permutation of the local ids.
    pub fn reorder_locally<I, S>(&mut self, order: I) -> Result<(), RoomError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.reorder_active {
            return Err(RoomError::Reorder("no reorder in progress".to_string()));
        }

        let mut reordered = Vec::with_capacity(self.local.len());
        let mut seen = HashSet::new();
        for id in order {
            let id = id.as_ref();
            if !seen.insert(id.to_string()) {
                return Err(RoomError::Reorder(format!("track {} appears twice", id)));
            }
            let track = self
                .local
                .iter()
                .find(|t| t.id() == id)
                .ok_or_else(|| RoomError::UnknownTrack(id.to_string()))?;
            reordered.push(track.clone());
        }
        if reordered.len() != self.local.len() {
            return Err(RoomError::Reorder(format!(
                "expected {} tracks, got {}",
                self.local.len(),
                reordered.len()
            )));
        }

        self.local = reordered;
        Ok(())
    }

    /// Ends the drag and returns the final order as a `update-tracks` proposal.
    ///
    /// If the authority pushed a different id-set during the drag, the
    /// local order is restricted to the ids still present and new ids are
    /// appended in authoritative order.
    pub fn end_reorder(&mut self) -> Result<ClientEvent, RoomError> {
        if !self.reorder_active {
            return Err(RoomError::Reorder("no reorder in progress".to_string()));
        }
        self.reorder_active = false;

        let known: HashSet<&str> = self.authoritative.iter().map(|t| t.id()).collect();
        let mut merged: Vec<MediaReference> = self
            .local
            .iter()
            .filter(|t| known.contains(t.id()))
            .cloned()
            .collect();
        let kept: HashSet<String> = merged.iter().map(|t| t.id().to_string()).collect();
        merged.extend(
            self.authoritative
                .iter()
                .filter(|t| !kept.contains(t.id()))
                .cloned(),
        );

        debug!(len = merged.len(), "Reorder finished");
        self.local = merged.clone();
        Ok(self.update_event(merged))
    }

    /// Abandons a drag and restores the authoritative order.
    pub fn cancel_reorder(&mut self) {
        if self.reorder_active {
            debug!("Reorder cancelled");
            self.reorder_active = false;
            self.local = self.authoritative.clone();
        }
    }

    /// Removes `id` from the local queue and returns the full resulting
    /// list as a proposal.
    pub fn delete_track(&mut self, id: &str) -> Result<ClientEvent, RoomError> {
        let before = self.local.len();
        let remaining: Vec<MediaReference> =
            self.local.iter().filter(|t| t.id() != id).cloned().collect();
        if remaining.len() == before {
            return Err(RoomError::UnknownTrack(id.to_string()));
        }

        debug!(track_id = id, "Deleting track");
        self.local = remaining.clone();
        Ok(self.update_event(remaining))
    }

    pub fn clear_all(&mut self) -> ClientEvent {
        debug!(len = self.local.len(), "Clearing queue");
        self.local.clear();
        self.pending.clear();
        self.update_event(Vec::new())
    }

    fn update_event(&self, tracks: Vec<MediaReference>) -> ClientEvent {
        ClientEvent::UpdateTracks {
            tracks,
            base_version: self.version,
        }
    }
}

fn dedup_by_id(tracks: Vec<MediaReference>) -> Vec<MediaReference> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .filter(|t| {
            let fresh = seen.insert(t.id().to_string());
            if !fresh {
                warn!(track_id = t.id(), "Dropping duplicate track id in push");
            }
            fresh
        })
        .collect()
}
