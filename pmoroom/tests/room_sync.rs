//! Two participants talking through an in-process relay authority.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pmoroom::{
    Action, AuthorityEvent, LoadGeneration, MediaWidget, MpscSessionChannel, PlaybackState,
    PlaybackPhase, RoomClient, RoomError, RoomEvent, RoomSettings, SessionState, WireMessage,
    pump_authority_events,
};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Clone, Debug, PartialEq)]
enum Call {
    Load(String, Option<f64>),
    Play,
    Pause,
    Stop,
    Volume(u8),
}

#[derive(Clone)]
struct Widget {
    calls: Arc<Mutex<Vec<Call>>>,
    ready: Arc<AtomicBool>,
}

impl Widget {
    fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: Call) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl MediaWidget for Widget {
    fn load(&mut self, media_id: &str, start_seconds: Option<f64>, _generation: LoadGeneration) -> anyhow::Result<()> {
        self.push(Call::Load(media_id.to_string(), start_seconds))
    }

    fn play(&mut self) -> anyhow::Result<()> {
        self.push(Call::Play)
    }

    fn pause(&mut self) -> anyhow::Result<()> {
        self.push(Call::Pause)
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.push(Call::Stop)
    }

    fn set_volume(&mut self, percent: u8) -> anyhow::Result<()> {
        self.push(Call::Volume(percent))
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

struct Participant {
    room: RoomClient,
    outbound: UnboundedReceiver<WireMessage>,
    widget: Widget,
    sent: Vec<WireMessage>,
}

/// Minimal session authority: keeps the queue, relays playback events to
/// the other participants and answers sync requests.
struct Relay {
    participants: Vec<Participant>,
    queue: Value,
    member_permissions: Value,
    sync_reply: Value,
}

impl Relay {
    fn new(member_permissions: Value) -> Self {
        Self {
            participants: Vec::new(),
            queue: json!([]),
            member_permissions,
            sync_reply: json!({"type": "TIME", "videoId": null, "currentTime": 0}),
        }
    }

    fn connect(&mut self) -> usize {
        let (channel, outbound) = MpscSessionChannel::pair();
        let widget = Widget::new();
        let room = RoomClient::new(RoomSettings::default(), channel, widget.clone());
        self.participants.push(Participant {
            room,
            outbound,
            widget,
            sent: Vec::new(),
        });
        self.participants.len() - 1
    }

    fn room(&self, who: usize) -> &RoomClient {
        &self.participants[who].room
    }

    /// Runs the relay until no participant has anything left to send.
    fn settle(&mut self) {
        loop {
            let mut frames = Vec::new();
            for (who, p) in self.participants.iter_mut().enumerate() {
                while let Ok(frame) = p.outbound.try_recv() {
                    p.sent.push(frame.clone());
                    frames.push((who, frame));
                }
            }
            if frames.is_empty() {
                return;
            }
            for (who, frame) in frames {
                for (target, reply) in self.route(who, frame) {
                    let event = AuthorityEvent::from_wire(&reply).unwrap();
                    let _ = self.participants[target].room.handle_event(event);
                }
            }
        }
    }

    fn everyone(&self) -> Vec<usize> {
        (0..self.participants.len()).collect()
    }

    fn others(&self, who: usize) -> Vec<usize> {
        self.everyone().into_iter().filter(|&i| i != who).collect()
    }

    fn route(&mut self, who: usize, frame: WireMessage) -> Vec<(usize, WireMessage)> {
        let to = |targets: Vec<usize>, event: &str, payload: Value| {
            targets
                .into_iter()
                .map(|t| (t, WireMessage::new(event, payload.clone())))
                .collect::<Vec<_>>()
        };

        match frame.event.as_str() {
            "join-room" => {
                let mut reply = self.member_permissions.clone();
                reply["type"] = json!("JOINED");
                to(vec![who], "join-room", reply)
            }
            "add-track" => {
                if let (Some(queue), Some(added)) = (
                    self.queue.as_array_mut(),
                    frame.payload["tracks"].as_array(),
                ) {
                    queue.extend(added.iter().cloned());
                }
                to(self.everyone(), "room-tracks", self.queue.clone())
            }
            "update-tracks" => {
                self.queue = frame.payload["tracks"].clone();
                to(self.everyone(), "room-tracks", self.queue.clone())
            }
            "update-current-playing" | "update-playing-status" => {
                to(self.others(who), &frame.event, frame.payload)
            }
            "sync-request" => to(vec![who], "sync-response", self.sync_reply.clone()),
            _ => Vec::new(),
        }
    }

    fn sent_events(&self, who: usize) -> Vec<String> {
        self.participants[who]
            .sent
            .iter()
            .map(|f| f.event.clone())
            .collect()
    }
}

fn room_with_two(member_permissions: Value) -> Relay {
    let mut relay = Relay::new(member_permissions);
    let host = relay.connect();
    let member = relay.connect();
    relay.room(host).create_room("party").unwrap();
    relay.room(member).join_room("party").unwrap();
    relay.settle();
    relay
}

const HOST: usize = 0;
const MEMBER: usize = 1;

#[test]
fn test_add_then_select_converges() {
    let mut relay = room_with_two(json!({"allowMemberToPlay": true}));
    assert!(relay.room(MEMBER).is_active());
    assert!(relay.room(MEMBER).permissions().can_play);

    let added = relay
        .room(HOST)
        .add_track("https://youtube.com/watch?v=abc123", Some("First"))
        .unwrap();
    relay
        .room(HOST)
        .add_track("https://youtu.be/def456", None)
        .unwrap();
    relay.settle();

    for who in [HOST, MEMBER] {
        let queue = relay.room(who).local_queue();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0], added);
        assert_eq!(queue[0].media_id(), "abc123");
        assert_eq!(queue[1].title(), "Video (def456)");
        assert_eq!(relay.room(who).display_queue().len(), 2);
    }

    relay.room(HOST).select_and_play(added.id()).unwrap();
    relay.settle();

    let state = relay.room(MEMBER).playback_state();
    assert_eq!(state.phase(), PlaybackPhase::Playing);
    assert_eq!(state.current_track_id.as_deref(), Some(added.id()));
    assert_eq!(state.current_index, Some(0));
    assert_eq!(
        relay.participants[MEMBER].widget.calls(),
        vec![Call::Load("abc123".to_string(), None), Call::Play]
    );

    // Member pauses; the host follows without clearing its current track.
    relay.room(MEMBER).toggle_pause().unwrap();
    relay.settle();
    let host_state = relay.room(HOST).playback_state();
    assert_eq!(host_state.phase(), PlaybackPhase::Loaded);
    assert_eq!(host_state.current_track_id.as_deref(), Some(added.id()));
}

#[test]
fn test_member_without_play_permission_emits_nothing() {
    let mut relay = room_with_two(json!({"allowMemberToPlay": false}));
    relay
        .room(HOST)
        .add_track("https://youtu.be/abc123", None)
        .unwrap();
    relay.settle();
    let before = relay.sent_events(MEMBER);
    let events = relay.room(MEMBER).subscribe();

    assert_eq!(
        relay.room(MEMBER).toggle_pause(),
        Err(RoomError::PermissionDenied(Action::PlayPause))
    );
    relay.settle();
    assert_eq!(relay.sent_events(MEMBER), before);
    assert_eq!(relay.room(MEMBER).playback_state().phase(), PlaybackPhase::Idle);
    assert!(relay.room(HOST).playback_state().current_track_id.is_none());
    assert!(events
        .try_iter()
        .any(|e| matches!(e, RoomEvent::Notice { .. })));
}

#[test]
fn test_delete_and_reorder_propagate() {
    let mut relay = room_with_two(json!({}));
    let ids: Vec<String> = ["aaa", "bbb", "ccc"]
        .iter()
        .map(|v| {
            relay
                .room(HOST)
                .add_track(&format!("https://youtu.be/{}", v), None)
                .unwrap()
                .id()
                .to_string()
        })
        .collect();
    relay.settle();

    relay.room(MEMBER).begin_reorder().unwrap();
    relay
        .room(MEMBER)
        .reorder_locally([&ids[2], &ids[0], &ids[1]])
        .unwrap();
    relay.room(MEMBER).end_reorder().unwrap();
    relay.settle();

    let expected = vec![ids[2].clone(), ids[0].clone(), ids[1].clone()];
    for who in [HOST, MEMBER] {
        let order: Vec<String> = relay
            .room(who)
            .local_queue()
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        assert_eq!(order, expected);
    }

    relay.room(HOST).delete_track(&ids[0]).unwrap();
    relay.settle();
    assert_eq!(relay.room(MEMBER).local_queue().len(), 2);
    assert_eq!(
        relay.room(MEMBER).authoritative_queue(),
        relay.room(HOST).authoritative_queue()
    );
}

#[tokio::test]
async fn test_sync_without_active_track_stops_player() {
    let mut relay = room_with_two(json!({"allowMemberToSync": true}));
    let member = relay.room(MEMBER).clone();

    let pending = tokio::spawn(async move { member.request_sync().await });
    while relay.sent_events(MEMBER).last().map(String::as_str) != Some("sync-request") {
        tokio::task::yield_now().await;
        relay.settle();
    }

    let snapshot = pending.await.unwrap().unwrap();
    assert_eq!(snapshot.media_id, None);
    assert_eq!(relay.participants[MEMBER].widget.calls(), vec![Call::Stop]);
    assert_eq!(
        relay.room(MEMBER).playback_state(),
        PlaybackState::default()
    );
}

#[tokio::test]
async fn test_sync_applies_snapshot() {
    let mut relay = room_with_two(json!({"allowMemberToSync": true}));
    relay.sync_reply = json!({
        "type": "TIME",
        "videoId": "remote1",
        "currentTime": 12.5,
        "playerState": 1
    });
    let member = relay.room(MEMBER).clone();

    let pending = tokio::spawn(async move { member.request_sync().await });
    while relay.sent_events(MEMBER).last().map(String::as_str) != Some("sync-request") {
        tokio::task::yield_now().await;
        relay.settle();
    }

    let snapshot = pending.await.unwrap().unwrap();
    assert_eq!(snapshot.media_id.as_deref(), Some("remote1"));
    assert_eq!(
        relay.participants[MEMBER].widget.calls(),
        vec![Call::Load("remote1".to_string(), Some(12.5)), Call::Play]
    );
}

#[tokio::test]
async fn test_pump_marks_session_lost_when_stream_ends() {
    let (channel, _outbound) = MpscSessionChannel::pair();
    let room = RoomClient::new(RoomSettings::default(), channel, Widget::new());
    room.join_room("party").unwrap();
    let lost = room.on_session_lost();

    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::unbounded_channel();
    let pump = tokio::spawn(pump_authority_events(room.clone(), inbound_rx));

    inbound_tx
        .send(WireMessage::new("join-room", json!({"type": "JOINED"})))
        .unwrap();
    inbound_tx
        .send(WireMessage::new("no-such-event", Value::Null))
        .unwrap();
    inbound_tx
        .send(WireMessage::new("room-tracks", json!([])))
        .unwrap();
    drop(inbound_tx);

    tokio::time::timeout(Duration::from_secs(1), pump)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(room.session_state(), SessionState::Lost { .. }));
    assert_eq!(lost.try_recv().unwrap().reason, "session channel disconnected");
}

#[tokio::test]
async fn test_clear_state_ends_pump() {
    let (channel, _outbound) = MpscSessionChannel::pair();
    let room = RoomClient::new(RoomSettings::default(), channel, Widget::new());
    room.create_room("party").unwrap();

    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::unbounded_channel();
    let pump = tokio::spawn(pump_authority_events(room.clone(), inbound_rx));
    inbound_tx
        .send(WireMessage::new("clear-state", Value::Null))
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), pump)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        room.session_state(),
        SessionState::Lost {
            reason: "Host has left the room".to_string()
        }
    );
    assert!(matches!(room.toggle_pause(), Err(RoomError::SessionLost(_))));
}
