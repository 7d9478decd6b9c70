mod machine;
mod widget;

pub use machine::{PlaybackMachine, SkipDirection, SyncOutcome};
pub use widget::{LoadGeneration, MediaWidget, WidgetEvent};
