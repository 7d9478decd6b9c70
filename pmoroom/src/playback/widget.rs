use anyhow::Result;

use crate::model::PlayerState;

/// Tag attached to every `load` so that callbacks from a superseded load
/// can be recognised and dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadGeneration(pub u64);

impl LoadGeneration {
    pub fn next(self) -> Self {
        LoadGeneration(self.0 + 1)
    }
}

/// The embedded video player of one client.
///
/// There is exactly one widget per client and it is owned by the
/// `PlaybackMachine`; nothing else issues commands to it.
pub trait MediaWidget: Send {
    /// Loads `media_id`, optionally starting at `start_seconds`.
    ///
    /// Callbacks triggered by this load must carry `generation`.
    fn load(&mut self, media_id: &str, start_seconds: Option<f64>, generation: LoadGeneration) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Sets the volume in percent (0..=100).
    fn set_volume(&mut self, percent: u8) -> Result<()>;

    /// True once the player can accept commands.
    fn is_ready(&self) -> bool;
}

/// Callbacks reported by the widget.
#[derive(Clone, Debug, PartialEq)]
pub enum WidgetEvent {
    Ready {
        generation: LoadGeneration,
    },
    StateChange {
        generation: LoadGeneration,
        state: PlayerState,
    },
}

impl WidgetEvent {
    pub fn generation(&self) -> LoadGeneration {
        match self {
            WidgetEvent::Ready { generation } => *generation,
            WidgetEvent::StateChange { generation, .. } => *generation,
        }
    }
}
