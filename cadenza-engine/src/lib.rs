//! # Cadenza Playback Engine (cadenza-engine)
//!
//! Engine-level orchestration for a desktop music player.
//!
//! **Purpose:** Own the current media pipeline, crossfade between two
//! concurrently running pipelines, keep looping background streams alive,
//! follow redirects when a source refuses to play, and report state to the
//! player controller through events.
//!
//! **Architecture:** The decode/output graph is an external collaborator
//! behind the [`pipeline::MediaPipeline`] trait. Pipelines report back
//! through a channel of [`pipeline::PipelineEvent`]s which the single
//! engine task processes in order, alongside caller commands and the
//! position-polling timer (see [`playback::runner`]).

pub mod consumer;
pub mod error;
pub mod media_url;
pub mod pipeline;
pub mod playback;

pub use consumer::{AudioBuffer, BufferConsumer, ConsumerRef, ConsumerSet};
pub use error::{Error, Result};
pub use playback::{BackgroundStreamId, EngineHandle, PlaybackEngine};
