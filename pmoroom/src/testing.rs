//! Recording doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;

use crate::channel::SessionChannel;
use crate::errors::RoomError;
use crate::playback::{LoadGeneration, MediaWidget};
use crate::protocol::ClientEvent;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum WidgetCall {
    Load {
        media_id: String,
        start: Option<f64>,
        generation: LoadGeneration,
    },
    Play,
    Pause,
    Stop,
    SetVolume(u8),
}

#[derive(Clone, Default)]
pub(crate) struct RecordingWidget {
    calls: Arc<Mutex<Vec<WidgetCall>>>,
    ready: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
}

impl RecordingWidget {
    pub(crate) fn ready() -> Self {
        let widget = Self::default();
        widget.set_ready(true);
        widget
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<WidgetCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: WidgetCall) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.failing.load(Ordering::SeqCst) {
            Err(anyhow!("widget unavailable"))
        } else {
            Ok(())
        }
    }
}

impl MediaWidget for RecordingWidget {
    fn load(&mut self, media_id: &str, start_seconds: Option<f64>, generation: LoadGeneration) -> anyhow::Result<()> {
        self.record(WidgetCall::Load {
            media_id: media_id.to_string(),
            start: start_seconds,
            generation,
        })
    }

    fn play(&mut self) -> anyhow::Result<()> {
        self.record(WidgetCall::Play)
    }

    fn pause(&mut self) -> anyhow::Result<()> {
        self.record(WidgetCall::Pause)
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.record(WidgetCall::Stop)
    }

    fn set_volume(&mut self, percent: u8) -> anyhow::Result<()> {
        self.record(WidgetCall::SetVolume(percent))
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingChannel {
    sent: Arc<Mutex<Vec<ClientEvent>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingChannel {
    pub(crate) fn sent(&self) -> Vec<ClientEvent> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl SessionChannel for RecordingChannel {
    fn send(&self, event: &ClientEvent) -> Result<(), RoomError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RoomError::session_lost("channel closed"));
        }
        self.sent.lock().unwrap().push(event.clone());
        Ok(())
    }
}
