//! Core playback engine - construction, settings and queries
//!
//! The engine owns every pipeline it creates. Pipelines talk back through
//! the event channel returned by [`PlaybackEngine::new`]; whoever drives the
//! engine (normally [`crate::playback::run_engine`]) feeds those events to
//! [`PlaybackEngine::handle_pipeline_event`] on the same task that issues
//! commands, so engine state is never touched concurrently.

use super::background::BackgroundStreamId;
use crate::consumer::{ConsumerRef, ConsumerSet};
use crate::error::{Error, Result};
use crate::pipeline::{MediaPipeline, PipelineEvent, PipelineEventSender, PipelineFactory, PipelineId};
use crate::playback::timer::PollTimer;
use cadenza_common::config::EngineSettings;
use cadenza_common::events::{EngineEvent, EngineState, EventBus};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, info, trace, warn};
use url::Url;

/// Map a linear volume percentage onto the curve sent to pipelines
///
/// Equal slider steps then sound roughly equally loud. 0 maps to 0 and
/// 100 to 100; anything in between is truncated, never rounded up.
pub fn make_volume_logarithmic(percent: u8) -> u8 {
    let percent = f64::from(percent.min(100));
    let curved = 100.0 - 100.0 * ((100.0 - percent) * 0.09 + 1.0).log10();
    curved.trunc().clamp(0.0, 100.0) as u8
}

/// Snapshot of the engine for status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub url: Option<String>,
    pub position_ms: u64,
    pub length_ms: u64,
    pub volume: u8,
    pub background_streams: Vec<BackgroundStreamId>,
}

/// Playback engine - owns the current, fadeout and background pipelines
pub struct PlaybackEngine {
    pub(super) factory: Box<dyn PipelineFactory>,

    /// Cached settings snapshot, replaced wholesale by `reload_settings`
    pub(super) settings: EngineSettings,

    pub(super) events: EventBus,

    /// Cloned into every pipeline's event sender
    pub(super) pipeline_tx: mpsc::UnboundedSender<PipelineEvent>,
    pub(super) next_pipeline_id: u64,

    pub(super) current: Option<Box<dyn MediaPipeline>>,

    /// Outgoing pipeline while it fades out; released on its FaderFinished
    pub(super) fadeout: Option<Box<dyn MediaPipeline>>,

    pub(super) background_streams: BTreeMap<BackgroundStreamId, Box<dyn MediaPipeline>>,
    pub(super) next_background_id: u32,

    pub(super) buffer_consumers: ConsumerSet,

    /// Last URL given to `load`; `None` after `stop`
    pub(super) url: Option<Url>,

    /// Linear volume as set by the user
    pub(super) volume: u8,
    pub(super) equalizer_enabled: bool,
    pub(super) equalizer_preamp: i32,
    pub(super) equalizer_gains: Vec<i32>,

    pub(super) timer: PollTimer,

    /// Whether TrackAboutToEnd has already fired for the current track
    pub(super) about_to_end_emitted: bool,
}

impl PlaybackEngine {
    /// Create an engine and the channel its pipelines report on
    pub fn new(
        factory: Box<dyn PipelineFactory>,
        settings: EngineSettings,
        events: EventBus,
    ) -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (pipeline_tx, pipeline_rx) = mpsc::unbounded_channel();
        let settings = settings.validated();

        info!(
            "Creating playback engine (sink={}, crossfade={}, autocrossfade={}, fadeout={}ms)",
            settings.output.sink,
            settings.crossfade_enabled,
            settings.autocrossfade_enabled,
            settings.fadeout_duration_ms
        );

        let engine = Self {
            factory,
            volume: settings.volume,
            equalizer_enabled: settings.equalizer.enabled,
            equalizer_preamp: settings.equalizer.preamp,
            equalizer_gains: settings.equalizer.band_gains.clone(),
            timer: PollTimer::new(Duration::from_millis(settings.poll_interval_ms)),
            settings,
            events,
            pipeline_tx,
            next_pipeline_id: 1,
            current: None,
            fadeout: None,
            background_streams: BTreeMap::new(),
            next_background_id: 0,
            buffer_consumers: ConsumerSet::new(),
            url: None,
            about_to_end_emitted: false,
        };

        (engine, pipeline_rx)
    }

    /// Replace the cached settings
    ///
    /// Pipelines that already exist keep what they were created with; the
    /// new values apply from the next `load`.
    pub fn reload_settings(&mut self, settings: EngineSettings) {
        let settings = settings.validated();
        info!(
            "Reloading engine settings (sink={}, device='{}', crossfade={}, autocrossfade={}, fadeout={}ms)",
            settings.output.sink,
            settings.output.device,
            settings.crossfade_enabled,
            settings.autocrossfade_enabled,
            settings.fadeout_duration_ms
        );

        self.equalizer_enabled = settings.equalizer.enabled;
        self.equalizer_preamp = settings.equalizer.preamp;
        self.equalizer_gains = settings.equalizer.band_gains.clone();
        self.timer
            .set_period(Duration::from_millis(settings.poll_interval_ms));
        self.settings = settings;
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    /// Engine state as seen by callers
    ///
    /// Without a pipeline the engine is `Idle` if a URL is still loaded
    /// and `Empty` otherwise.
    pub fn state(&self) -> EngineState {
        match &self.current {
            Some(pipeline) => pipeline.state().engine_state(),
            None if self.url.is_some() => EngineState::Idle,
            None => EngineState::Empty,
        }
    }

    pub fn position_ms(&self) -> u64 {
        self.current.as_ref().map_or(0, |p| p.position_ms())
    }

    pub fn length_ms(&self) -> u64 {
        self.current.as_ref().map_or(0, |p| p.length_ms())
    }

    pub fn current_url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn current_pipeline_id(&self) -> Option<PipelineId> {
        self.current.as_ref().map(|p| p.id())
    }

    pub fn fadeout_pipeline_id(&self) -> Option<PipelineId> {
        self.fadeout.as_ref().map(|p| p.id())
    }

    pub fn is_timer_active(&self) -> bool {
        self.timer.is_active()
    }

    pub fn buffer_consumer_count(&self) -> usize {
        self.buffer_consumers.len()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state(),
            url: self.url.as_ref().map(Url::to_string),
            position_ms: self.position_ms(),
            length_ms: self.length_ms(),
            volume: self.volume,
            background_streams: self.background_stream_ids(),
        }
    }

    /// Release every pipeline and stop the timer
    pub fn shutdown(&mut self) {
        info!("Shutting down playback engine");
        self.timer.stop();
        self.current = None;
        self.fadeout = None;
        let streams = std::mem::take(&mut self.background_streams);
        if !streams.is_empty() {
            debug!("Releasing {} background stream(s)", streams.len());
        }
        drop(streams);
    }

    /// Build and initialise a pipeline for `url`
    ///
    /// Output, replay gain and (when `attach_consumers` is set) the
    /// registered buffer consumers are applied before `init`.
    pub(super) fn create_pipeline(
        &mut self,
        url: &Url,
        attach_consumers: bool,
    ) -> Result<Box<dyn MediaPipeline>> {
        let id = PipelineId::new(self.next_pipeline_id);
        self.next_pipeline_id += 1;

        let sender = PipelineEventSender::new(id, self.pipeline_tx.clone());
        let mut pipeline = self.factory.create(sender);
        pipeline.set_output_device(&self.settings.output);
        pipeline.set_replay_gain(&self.settings.replay_gain);

        if attach_consumers {
            self.buffer_consumers.prune();
            for consumer in self.buffer_consumers.iter() {
                pipeline.add_buffer_consumer(consumer.clone());
            }
        }

        pipeline.init(url).map_err(|e| match e {
            Error::Pipeline(_) => e,
            other => Error::Pipeline(format!("{}: {}", url, other)),
        })?;

        debug!("Created {} for {}", id, url);
        Ok(pipeline)
    }

    /// Push volume and equalizer state into the current pipeline
    pub(super) fn apply_audio_settings(&mut self) {
        let volume = make_volume_logarithmic(self.volume);
        if let Some(pipeline) = self.current.as_mut() {
            pipeline.set_volume(volume);
            pipeline.set_equalizer_enabled(self.equalizer_enabled);
            pipeline.set_equalizer_params(self.equalizer_preamp, &self.equalizer_gains);
        }
    }

    /// Attach a consumer to the current pipeline if there is one
    pub(super) fn attach_consumer_to_current(&mut self, consumer: ConsumerRef) {
        if let Some(pipeline) = self.current.as_mut() {
            pipeline.add_buffer_consumer(consumer);
        }
    }

    pub(super) fn emit(&self, event: EngineEvent) {
        trace!("Emitting {}", event.event_type());
        if self.events.emit(event).is_err() {
            trace!("No event subscribers");
        }
    }

    pub(super) fn emit_state(&self, state: EngineState) {
        self.emit(EngineEvent::state_changed(state));
    }

    /// Release the current pipeline after an unrecoverable failure
    pub(super) fn fail_current(&mut self, message: String) {
        warn!("{}", message);
        self.current = None;
        self.timer.stop();
        self.about_to_end_emitted = false;
        self.emit(EngineEvent::error(message));
        self.emit_state(EngineState::Empty);
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if self.current.is_some() || self.fadeout.is_some() || !self.background_streams.is_empty() {
            self.shutdown();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::StubFactory;
    use super::*;

    #[test]
    fn test_volume_curve_endpoints() {
        assert_eq!(make_volume_logarithmic(0), 0);
        assert_eq!(make_volume_logarithmic(100), 100);
        assert_eq!(make_volume_logarithmic(200), 100);
    }

    #[test]
    fn test_volume_curve_is_monotonic() {
        let mut last = 0;
        for percent in 0..=100u8 {
            let curved = make_volume_logarithmic(percent);
            assert!(curved >= last, "curve dips at {}", percent);
            last = curved;
        }
        assert_eq!(make_volume_logarithmic(1), 0);
        assert_eq!(make_volume_logarithmic(50), 25);
        assert_eq!(make_volume_logarithmic(80), 55);
        assert_eq!(make_volume_logarithmic(99), 96);
    }

    #[test]
    fn test_new_engine_is_empty() {
        let (factory, _log) = StubFactory::new();
        let (engine, _rx) =
            PlaybackEngine::new(Box::new(factory), EngineSettings::default(), EventBus::new(16));

        assert_eq!(engine.state(), EngineState::Empty);
        assert_eq!(engine.position_ms(), 0);
        assert_eq!(engine.length_ms(), 0);
        assert!(engine.current_pipeline_id().is_none());
        assert!(!engine.is_timer_active());
        assert_eq!(engine.volume(), 100);
    }

    #[test]
    fn test_reload_settings_validates() {
        let (factory, _log) = StubFactory::new();
        let (mut engine, _rx) =
            PlaybackEngine::new(Box::new(factory), EngineSettings::default(), EventBus::new(16));

        let mut settings = EngineSettings::default();
        settings.crossfade_enabled = true;
        settings.fadeout_duration_ms = 0;
        settings.poll_interval_ms = 250;
        engine.reload_settings(settings);

        assert!(!engine.settings().crossfade_enabled);
        assert_eq!(engine.timer.period(), Duration::from_millis(250));
    }
}
