//! Playback engine and its event loop

pub mod engine;
pub mod runner;
pub mod timer;

pub use engine::{BackgroundStreamId, EngineStatus, PlaybackEngine};
pub use runner::{run_engine, spawn_engine, EngineCommand, EngineHandle};
pub use timer::PollTimer;
