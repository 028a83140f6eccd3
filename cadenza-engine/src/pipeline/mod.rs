//! Media pipeline contract
//!
//! A pipeline is one decode/render graph playing one URL. The graph itself
//! (demuxers, decoders, sinks) lives outside this crate; the engine only
//! drives it through [`MediaPipeline`] and hears back from it through
//! [`PipelineEvent`]s sent on the engine's event channel.
//!
//! Pipelines run their streaming work on their own threads. Events they
//! raise are queued on the channel and handled on the engine task, so the
//! engine sees them in emission order but possibly after it has already
//! replaced the pipeline that sent them. Every event therefore carries the
//! sender's [`PipelineId`].

pub mod probe;
pub mod simulated;

use crate::consumer::ConsumerRef;
use crate::error::Result;
use cadenza_common::config::{OutputSettings, ReplayGainSettings};
use cadenza_common::events::{FadeDirection, MetaBundle, PipelineState};
use tokio::sync::mpsc;
use url::Url;

pub use cadenza_common::config::sink_supports_device;
pub use simulated::{SimulatedPipeline, SimulatedPipelineFactory};

/// Engine-assigned identity of a pipeline instance
///
/// Never reused within one engine, so a stale event can always be told
/// apart from one sent by the pipeline's successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(u64);

impl PipelineId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pipeline-{}", self.0)
    }
}

/// What a pipeline reports back to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEventKind {
    /// The stream ended
    ///
    /// `has_next_track` is true when the pipeline moved straight on to the
    /// URL given by `set_next_url` (gapless continuation or a looping
    /// background stream).
    EndOfStream { has_next_track: bool },

    /// Streaming failed (decode error, device lost, ...)
    Error(String),

    /// Tags found in the stream
    MetadataFound(MetaBundle),

    /// A fader started with `start_fader` reached its end
    FaderFinished,

    /// The pipeline has been released and torn down
    Destroyed,
}

/// Event tagged with the pipeline that raised it
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvent {
    pub source: PipelineId,
    pub kind: PipelineEventKind,
}

/// Sending half handed to each pipeline at construction
///
/// Stamps every event with the owning pipeline's id.
#[derive(Debug, Clone)]
pub struct PipelineEventSender {
    id: PipelineId,
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl PipelineEventSender {
    pub fn new(id: PipelineId, tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Queue an event for the engine
    ///
    /// Returns false once the engine is gone; pipelines treat that as
    /// "nobody is listening" and carry on tearing down.
    pub fn send(&self, kind: PipelineEventKind) -> bool {
        self.tx
            .send(PipelineEvent {
                source: self.id,
                kind,
            })
            .is_ok()
    }
}

/// One decode/render graph for one URL
///
/// Construction only allocates; `init` builds the graph for a URL and is
/// where missing plugins or unreadable sources are reported. State changes
/// are requests that return quickly; the graph completes them on its own
/// threads.
pub trait MediaPipeline: Send {
    fn id(&self) -> PipelineId;

    /// Choose the output sink and device (empty device = sink default)
    fn set_output_device(&mut self, output: &OutputSettings);

    fn set_replay_gain(&mut self, replay_gain: &ReplayGainSettings);

    /// Build the graph for `url`
    fn init(&mut self, url: &Url) -> Result<()>;

    /// Request a state transition; an error means the request was refused
    fn set_state(&mut self, state: PipelineState) -> Result<()>;

    fn state(&self) -> PipelineState;

    fn seek(&mut self, position_ms: u64) -> Result<()>;

    fn position_ms(&self) -> u64;

    /// Stream length, 0 when unknown (live streams)
    fn length_ms(&self) -> u64;

    /// URL the pipeline is currently playing, `None` before `init`
    ///
    /// Changes when the pipeline moves on to its next URL.
    fn url(&self) -> Option<Url>;

    /// Alternative URL offered by the source after refusing to play
    fn redirect_url(&self) -> Option<Url>;

    /// Volume in percent (0-100), applied after replay gain
    fn set_volume(&mut self, percent: u8);

    fn set_equalizer_enabled(&mut self, enabled: bool);

    fn set_equalizer_params(&mut self, preamp: i32, band_gains: &[i32]);

    /// Ramp volume over `duration_ms`; raises `FaderFinished` at the end
    fn start_fader(&mut self, duration_ms: u64, direction: FadeDirection);

    fn add_buffer_consumer(&mut self, consumer: ConsumerRef);

    fn remove_buffer_consumer(&mut self, consumer: &ConsumerRef);

    fn remove_all_buffer_consumers(&mut self);

    /// URL to continue with when the current stream ends
    fn set_next_url(&mut self, url: &Url);
}

/// Creates pipelines for the engine
///
/// The engine configures and initialises each pipeline right after
/// creation; a factory only needs to allocate one wired to `events`.
pub trait PipelineFactory: Send {
    fn create(&mut self, events: PipelineEventSender) -> Box<dyn MediaPipeline>;
}
