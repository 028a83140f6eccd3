//! Playback engine
//!
//! **Module Structure:**
//! - `core.rs`: engine struct, construction, settings, queries, pipeline creation
//! - `transport.rs`: load, play, pause, stop, seek, volume, equalizer, consumers
//! - `crossfade.rs`: fade-out sequencing
//! - `background.rs`: looping background streams
//! - `dispatch.rs`: pipeline event routing and polling-timer ticks

mod background;
mod core;
mod crossfade;
mod dispatch;
mod transport;

pub use self::background::BackgroundStreamId;
pub use self::core::{make_volume_logarithmic, EngineStatus, PlaybackEngine};
