//! # Cadenza Common Library
//!
//! Shared vocabulary for the cadenza playback engine and its front-ends:
//! - Event types (`EngineEvent`) and the broadcast `EventBus`
//! - Engine, pipeline and fade enumerations
//! - Engine settings and config file resolution
//! - Human-readable time formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;

pub use config::EngineSettings;
pub use error::{Error, Result};
pub use events::{EngineEvent, EngineState, EventBus, TrackChangeKind};
