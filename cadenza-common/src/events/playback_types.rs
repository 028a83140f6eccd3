//! Playback-related type definitions
//!
//! Supporting enumerations for engine state, pipeline state and fades.

use serde::{Deserialize, Serialize};

/// Engine-level playback state as reported to callers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Nothing loaded
    Empty,
    /// A track is loaded but not playing
    Idle,
    Playing,
    Paused,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Empty => write!(f, "empty"),
            EngineState::Idle => write!(f, "idle"),
            EngineState::Playing => write!(f, "playing"),
            EngineState::Paused => write!(f, "paused"),
        }
    }
}

/// Lifecycle state of a single media pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum PipelineState {
    Null,
    Ready,
    Playing,
    Paused,
}

impl PipelineState {
    /// Map a pipeline state onto the engine state callers see
    pub fn engine_state(self) -> EngineState {
        match self {
            PipelineState::Null => EngineState::Empty,
            PipelineState::Ready => EngineState::Idle,
            PipelineState::Playing => EngineState::Playing,
            PipelineState::Paused => EngineState::Paused,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Null => write!(f, "Null"),
            PipelineState::Ready => write!(f, "Ready"),
            PipelineState::Playing => write!(f, "Playing"),
            PipelineState::Paused => write!(f, "Paused"),
        }
    }
}

/// Why a track is being loaded
///
/// Manual changes come from the user (skip, double-click); automatic ones
/// come from the playlist advancing at the end of a track.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackChangeKind {
    Manual,
    Auto,
}

/// Direction of a volume fader
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FadeDirection {
    /// Silence to full volume
    Forward,
    /// Full volume to silence
    Backward,
}

impl FadeDirection {
    /// Gain at `progress` (0.0..=1.0) through a linear fade in this direction
    pub fn gain_at(self, progress: f64) -> f64 {
        let progress = progress.clamp(0.0, 1.0);
        match self {
            FadeDirection::Forward => progress,
            FadeDirection::Backward => 1.0 - progress,
        }
    }
}
