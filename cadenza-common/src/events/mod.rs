//! Event types for the cadenza event system
//!
//! Provides the engine's outward event vocabulary and the EventBus used to
//! deliver it to front-ends.

// Sub-modules (supporting types)
mod playback_types;
mod shared_types;

pub use playback_types::{EngineState, FadeDirection, PipelineState, TrackChangeKind};
pub use shared_types::MetaBundle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Engine event types
///
/// Events are broadcast via EventBus and can be serialized (e.g. as JSON
/// lines by the CLI). Every variant carries the time it was raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Engine state changed
    ///
    /// Raised on play, pause, unpause, stop and whenever the current
    /// pipeline is lost (error, failed play).
    StateChanged {
        state: EngineState,
        timestamp: DateTime<Utc>,
    },

    /// The current track reached its end
    ///
    /// The controller normally reacts by loading the next track with
    /// `TrackChangeKind::Auto`.
    TrackEnded { timestamp: DateTime<Utc> },

    /// The current track is close enough to its end that the next one
    /// should be loaded now (crossfade or gapless preload)
    ///
    /// Raised at most once per loaded track.
    TrackAboutToEnd { timestamp: DateTime<Utc> },

    /// A playback error the engine could not recover from
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Metadata found in the current stream
    MetaData {
        bundle: MetaBundle,
        timestamp: DateTime<Utc>,
    },

    /// Periodic position report while playing
    ///
    /// Emitted on every polling-timer tick.
    Tick {
        position_ms: u64,
        length_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn state_changed(state: EngineState) -> Self {
        EngineEvent::StateChanged {
            state,
            timestamp: Utc::now(),
        }
    }

    pub fn track_ended() -> Self {
        EngineEvent::TrackEnded {
            timestamp: Utc::now(),
        }
    }

    pub fn track_about_to_end() -> Self {
        EngineEvent::TrackAboutToEnd {
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        EngineEvent::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn metadata(bundle: MetaBundle) -> Self {
        EngineEvent::MetaData {
            bundle,
            timestamp: Utc::now(),
        }
    }

    pub fn tick(position_ms: u64, length_ms: u64) -> Self {
        EngineEvent::Tick {
            position_ms,
            length_ms,
            timestamp: Utc::now(),
        }
    }

    /// Short variant name, used in log lines
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::StateChanged { .. } => "StateChanged",
            EngineEvent::TrackEnded { .. } => "TrackEnded",
            EngineEvent::TrackAboutToEnd { .. } => "TrackAboutToEnd",
            EngineEvent::Error { .. } => "Error",
            EngineEvent::MetaData { .. } => "MetaData",
            EngineEvent::Tick { .. } => "Tick",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for engine events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use cadenza_common::events::{EngineEvent, EngineState, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(EngineEvent::state_changed(EngineState::Playing));
///
/// match rx.try_recv() {
///     Ok(EngineEvent::StateChanged { state, .. }) => assert_eq!(state, EngineState::Playing),
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers lag
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EngineEvent,
    ) -> Result<usize, broadcast::error::SendError<EngineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
