//! Clock-driven reference pipeline
//!
//! Stands in for a real decode/output graph: local files are probed for
//! length and tags, then "played" against the tokio clock. The pipeline
//! honours every part of the [`MediaPipeline`] contract the engine relies
//! on (state requests, seeking, faders, next-URL continuation, buffer
//! delivery to consumers) and raises the same events a real graph would.
//!
//! Buffers handed to consumers are silent; their timing and size match
//! what a 44.1kHz stereo stream would deliver.

use super::probe::probe_file;
use super::{MediaPipeline, PipelineEventKind, PipelineEventSender, PipelineFactory, PipelineId};
use crate::consumer::{AudioBuffer, ConsumerRef, ConsumerSet};
use crate::error::{Error, Result};
use crate::media_url;
use cadenza_common::config::{OutputSettings, ReplayGainSettings};
use cadenza_common::events::{FadeDirection, MetaBundle, PipelineState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};
use url::Url;

/// Streaming clock period; one buffer is delivered per period
const CLOCK_PERIOD: Duration = Duration::from_millis(100);

const BUFFER_SAMPLE_RATE: u32 = 44_100;
const BUFFER_CHANNELS: u16 = 2;

/// Factory for [`SimulatedPipeline`]s
#[derive(Debug, Default)]
pub struct SimulatedPipelineFactory;

impl SimulatedPipelineFactory {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineFactory for SimulatedPipelineFactory {
    fn create(&mut self, events: PipelineEventSender) -> Box<dyn MediaPipeline> {
        Box::new(SimulatedPipeline::new(events))
    }
}

/// A running fade
#[derive(Debug, Clone, Copy)]
struct Fade {
    direction: FadeDirection,
    duration: Duration,
    started: Instant,
}

impl Fade {
    fn gain(&self) -> f64 {
        if self.duration.is_zero() {
            return self.direction.gain_at(1.0);
        }
        let progress = self.started.elapsed().as_secs_f64() / self.duration.as_secs_f64();
        self.direction.gain_at(progress)
    }
}

/// Transport state shared with the clock and fader tasks
#[derive(Debug)]
struct Transport {
    state: PipelineState,
    url: Option<Url>,
    next_url: Option<Url>,
    length_ms: u64,
    /// Position at the moment `playing_since` was taken (or the frozen
    /// position when not playing)
    base_position_ms: u64,
    playing_since: Option<Instant>,
    volume: u8,
    fade: Option<Fade>,
    /// Gain a completed fade left behind (0.0 after a fade-out)
    resting_gain: f64,
    consumers: ConsumerSet,
    metadata: MetaBundle,
    metadata_sent: bool,
}

impl Transport {
    fn position_ms(&self) -> u64 {
        let running = self
            .playing_since
            .map(|since| since.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let position = self.base_position_ms + running;
        if self.length_ms > 0 {
            position.min(self.length_ms)
        } else {
            position
        }
    }

    fn freeze(&mut self) {
        self.base_position_ms = self.position_ms();
        self.playing_since = None;
    }

    fn gain(&self) -> f64 {
        let fade_gain = self.fade.map(|f| f.gain()).unwrap_or(self.resting_gain);
        fade_gain * f64::from(self.volume) / 100.0
    }
}

fn lock(transport: &Mutex<Transport>) -> MutexGuard<'_, Transport> {
    transport.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What the clock decided at the end of a period
enum ClockStep {
    Continue,
    Ended,
    Continued(Url),
}

/// Reference [`MediaPipeline`] driven by the tokio clock
pub struct SimulatedPipeline {
    id: PipelineId,
    events: PipelineEventSender,
    transport: Arc<Mutex<Transport>>,
    clock_task: Option<JoinHandle<()>>,
    fader_task: Option<JoinHandle<()>>,
    output: OutputSettings,
    replay_gain: ReplayGainSettings,
    equalizer_enabled: bool,
    equalizer_preamp: i32,
    equalizer_gains: Vec<i32>,
}

impl SimulatedPipeline {
    pub fn new(events: PipelineEventSender) -> Self {
        Self {
            id: events.id(),
            events,
            transport: Arc::new(Mutex::new(Transport {
                state: PipelineState::Null,
                url: None,
                next_url: None,
                length_ms: 0,
                base_position_ms: 0,
                playing_since: None,
                volume: 100,
                fade: None,
                resting_gain: 1.0,
                consumers: ConsumerSet::new(),
                metadata: MetaBundle::default(),
                metadata_sent: false,
            })),
            clock_task: None,
            fader_task: None,
            output: OutputSettings::default(),
            replay_gain: ReplayGainSettings::default(),
            equalizer_enabled: false,
            equalizer_preamp: 0,
            equalizer_gains: Vec::new(),
        }
    }

    /// Current output gain: volume scaled by any running or finished fade
    pub fn output_gain(&self) -> f64 {
        lock(&self.transport).gain()
    }

    fn stop_clock(&mut self) {
        if let Some(task) = self.clock_task.take() {
            task.abort();
        }
    }

    /// Spawn the streaming clock; the transport must already be playing
    fn start_clock(&mut self, runtime: &tokio::runtime::Handle) {
        self.stop_clock();
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        self.clock_task = Some(runtime.spawn(run_clock(transport, events)));
    }
}

/// Resolve a URL to length and tags
fn open_source(url: &Url) -> Result<(u64, MetaBundle)> {
    match url.scheme() {
        "file" => {
            let path = media_url::local_path(url)
                .ok_or_else(|| Error::Pipeline(format!("not a local path: {}", url)))?;
            let info = probe_file(&path).map_err(|e| Error::Pipeline(e.to_string()))?;
            Ok((info.length_ms, info.metadata))
        }
        // Live streams: unknown length, tags arrive later (if ever)
        "http" | "https" => Ok((0, MetaBundle::default())),
        other => Err(Error::UnsupportedScheme(other.to_string())),
    }
}

async fn run_clock(transport: Arc<Mutex<Transport>>, events: PipelineEventSender) {
    let id = events.id();
    let frames_per_period =
        (BUFFER_SAMPLE_RATE as u64 * CLOCK_PERIOD.as_millis() as u64 / 1000) as usize;
    let silence: Arc<[f32]> = vec![0.0; frames_per_period * BUFFER_CHANNELS as usize].into();

    let mut ticker = tokio::time::interval(CLOCK_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let step = {
            let mut t = lock(&transport);
            if t.state != PipelineState::Playing {
                return;
            }
            let position_ms = t.position_ms();
            let buffer = AudioBuffer {
                samples: Arc::clone(&silence),
                sample_rate: BUFFER_SAMPLE_RATE,
                channels: BUFFER_CHANNELS,
                position_ms,
            };
            t.consumers.deliver(&buffer, id);

            if t.length_ms > 0 && position_ms >= t.length_ms {
                match t.next_url.take() {
                    Some(next) => ClockStep::Continued(next),
                    None => {
                        t.freeze();
                        t.state = PipelineState::Ready;
                        ClockStep::Ended
                    }
                }
            } else {
                ClockStep::Continue
            }
        };

        match step {
            ClockStep::Continue => {}
            ClockStep::Ended => {
                debug!("{} reached end of stream", id);
                events.send(PipelineEventKind::EndOfStream {
                    has_next_track: false,
                });
                return;
            }
            ClockStep::Continued(next) => {
                // Probe outside the lock; it touches the filesystem
                let opened = open_source(&next);
                let mut t = lock(&transport);
                match opened {
                    Ok((length_ms, metadata)) => {
                        debug!("{} continuing with {}", id, next);
                        // A stream looping onto itself keeps looping even if
                        // it ends again before anyone re-sets the next URL
                        if t.next_url.is_none() && t.url.as_ref() == Some(&next) {
                            t.next_url = Some(next.clone());
                        }
                        t.url = Some(next);
                        t.length_ms = length_ms;
                        t.base_position_ms = 0;
                        t.playing_since = Some(Instant::now());
                        t.metadata = metadata.clone();
                        t.metadata_sent = !metadata.is_empty();
                        drop(t);
                        events.send(PipelineEventKind::EndOfStream {
                            has_next_track: true,
                        });
                        if !metadata.is_empty() {
                            events.send(PipelineEventKind::MetadataFound(metadata));
                        }
                    }
                    Err(e) => {
                        t.freeze();
                        t.state = PipelineState::Null;
                        drop(t);
                        warn!("{} could not continue with {}: {}", id, next, e);
                        events.send(PipelineEventKind::Error(e.to_string()));
                        return;
                    }
                }
            }
        }
    }
}

impl MediaPipeline for SimulatedPipeline {
    fn id(&self) -> PipelineId {
        self.id
    }

    fn set_output_device(&mut self, output: &OutputSettings) {
        self.output = output.clone();
    }

    fn set_replay_gain(&mut self, replay_gain: &ReplayGainSettings) {
        self.replay_gain = replay_gain.clone();
    }

    fn init(&mut self, url: &Url) -> Result<()> {
        let (length_ms, metadata) = open_source(url)?;
        let mut t = lock(&self.transport);
        t.url = Some(url.clone());
        t.length_ms = length_ms;
        t.metadata = metadata;
        t.state = PipelineState::Ready;
        debug!(
            "{} ready for {} (sink={}, replaygain={})",
            self.id, url, self.output.sink, self.replay_gain.enabled
        );
        Ok(())
    }

    fn set_state(&mut self, state: PipelineState) -> Result<()> {
        let current = {
            let t = lock(&self.transport);
            if t.url.is_none() {
                return Err(Error::Pipeline(format!("{} not initialised", self.id)));
            }
            t.state
        };
        if current == state {
            return Ok(());
        }

        match state {
            PipelineState::Playing => {
                let runtime = tokio::runtime::Handle::try_current()
                    .map_err(|e| Error::PlayFailed(format!("no async runtime: {}", e)))?;
                let metadata = {
                    let mut t = lock(&self.transport);
                    if t.length_ms > 0 && t.base_position_ms >= t.length_ms {
                        t.base_position_ms = 0;
                    }
                    t.playing_since = Some(Instant::now());
                    t.state = PipelineState::Playing;
                    if !t.metadata_sent && !t.metadata.is_empty() {
                        t.metadata_sent = true;
                        Some(t.metadata.clone())
                    } else {
                        None
                    }
                };
                self.start_clock(&runtime);
                if let Some(metadata) = metadata {
                    self.events.send(PipelineEventKind::MetadataFound(metadata));
                }
            }
            PipelineState::Paused => {
                self.stop_clock();
                let mut t = lock(&self.transport);
                t.freeze();
                t.state = PipelineState::Paused;
            }
            PipelineState::Ready | PipelineState::Null => {
                self.stop_clock();
                let mut t = lock(&self.transport);
                t.base_position_ms = 0;
                t.playing_since = None;
                t.state = state;
            }
        }
        trace!("{} {} -> {}", self.id, current, state);
        Ok(())
    }

    fn state(&self) -> PipelineState {
        lock(&self.transport).state
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        let mut t = lock(&self.transport);
        if t.url.is_none() {
            return Err(Error::Pipeline(format!("{} not initialised", self.id)));
        }
        if t.length_ms > 0 && position_ms > t.length_ms {
            return Err(Error::Pipeline(format!(
                "seek to {}ms beyond end ({}ms)",
                position_ms, t.length_ms
            )));
        }
        t.base_position_ms = position_ms;
        if t.playing_since.is_some() {
            t.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        lock(&self.transport).position_ms()
    }

    fn length_ms(&self) -> u64 {
        lock(&self.transport).length_ms
    }

    fn url(&self) -> Option<Url> {
        lock(&self.transport).url.clone()
    }

    fn redirect_url(&self) -> Option<Url> {
        None
    }

    fn set_volume(&mut self, percent: u8) {
        lock(&self.transport).volume = percent.min(100);
    }

    fn set_equalizer_enabled(&mut self, enabled: bool) {
        self.equalizer_enabled = enabled;
    }

    fn set_equalizer_params(&mut self, preamp: i32, band_gains: &[i32]) {
        self.equalizer_preamp = preamp;
        self.equalizer_gains = band_gains.to_vec();
        trace!(
            "{} equalizer enabled={} preamp={} bands={:?}",
            self.id,
            self.equalizer_enabled,
            preamp,
            band_gains
        );
    }

    fn start_fader(&mut self, duration_ms: u64, direction: FadeDirection) {
        if let Some(task) = self.fader_task.take() {
            task.abort();
        }
        let duration = Duration::from_millis(duration_ms);
        lock(&self.transport).fade = Some(Fade {
            direction,
            duration,
            started: Instant::now(),
        });

        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        let finish = async move {
            tokio::time::sleep(duration).await;
            {
                let mut t = lock(&transport);
                t.fade = None;
                t.resting_gain = direction.gain_at(1.0);
            }
            events.send(PipelineEventKind::FaderFinished);
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => self.fader_task = Some(runtime.spawn(finish)),
            Err(_) => {
                warn!("{} has no async runtime, finishing fade immediately", self.id);
                let mut t = lock(&self.transport);
                t.fade = None;
                t.resting_gain = direction.gain_at(1.0);
                drop(t);
                self.events.send(PipelineEventKind::FaderFinished);
            }
        }
    }

    fn add_buffer_consumer(&mut self, consumer: ConsumerRef) {
        lock(&self.transport).consumers.add(consumer);
    }

    fn remove_buffer_consumer(&mut self, consumer: &ConsumerRef) {
        lock(&self.transport).consumers.remove(consumer);
    }

    fn remove_all_buffer_consumers(&mut self) {
        lock(&self.transport).consumers.clear();
    }

    fn set_next_url(&mut self, url: &Url) {
        lock(&self.transport).next_url = Some(url.clone());
    }
}

impl Drop for SimulatedPipeline {
    fn drop(&mut self) {
        self.stop_clock();
        if let Some(task) = self.fader_task.take() {
            task.abort();
        }
        self.events.send(PipelineEventKind::Destroyed);
    }
}
