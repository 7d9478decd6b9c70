mod reconciler;

pub use reconciler::TrackQueue;
