//! Scripted pipeline double
//!
//! Pipelines built by [`FakePipelineFactory`] behave according to a shared
//! [`Script`] (which URLs fail to init, which refuse to play and what
//! redirect they offer) and record everything the engine does to them.

use cadenza_common::config::{OutputSettings, ReplayGainSettings};
use cadenza_common::events::{FadeDirection, PipelineState};
use cadenza_engine::consumer::ConsumerRef;
use cadenza_engine::pipeline::{
    MediaPipeline, PipelineEventKind, PipelineEventSender, PipelineFactory, PipelineId,
};
use cadenza_engine::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use url::Url;

/// Everything observed about one pipeline
#[derive(Debug, Clone)]
pub struct PipelineRecord {
    pub id: PipelineId,
    pub url: Option<Url>,
    pub output: Option<OutputSettings>,
    pub replay_gain: Option<ReplayGainSettings>,
    pub requested_states: Vec<PipelineState>,
    pub state: PipelineState,
    pub seeks: Vec<u64>,
    pub volume: Option<u8>,
    pub equalizer_enabled: Option<bool>,
    pub equalizer_params: Option<(i32, Vec<i32>)>,
    pub faders: Vec<(u64, FadeDirection)>,
    pub consumers: Vec<ConsumerRef>,
    pub next_urls: Vec<Url>,
    pub released: bool,
}

impl PipelineRecord {
    fn new(id: PipelineId) -> Self {
        Self {
            id,
            url: None,
            output: None,
            replay_gain: None,
            requested_states: Vec::new(),
            state: PipelineState::Null,
            seeks: Vec::new(),
            volume: None,
            equalizer_enabled: None,
            equalizer_params: None,
            faders: Vec::new(),
            consumers: Vec::new(),
            next_urls: Vec::new(),
            released: false,
        }
    }

    pub fn has_consumer(&self, consumer: &ConsumerRef) -> bool {
        self.consumers.iter().any(|c| Weak::ptr_eq(c, consumer))
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    fail_init: HashSet<Url>,
    refuse_play: HashMap<Url, Option<Url>>,
    length_ms: u64,
    records: Vec<PipelineRecord>,
    senders: HashMap<PipelineId, PipelineEventSender>,
}

/// Shared behaviour script and call log
#[derive(Debug, Clone, Default)]
pub struct Script {
    inner: Arc<Mutex<ScriptState>>,
}

impl Script {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.inner.lock().unwrap()
    }

    /// Make `init` fail for `url`
    pub fn fail_init(&self, url: &Url) {
        self.lock().fail_init.insert(url.clone());
    }

    /// Make `set_state(Playing)` fail for `url`, offering `redirect`
    pub fn refuse_play(&self, url: &Url, redirect: Option<&Url>) {
        self.lock().refuse_play.insert(url.clone(), redirect.cloned());
    }

    /// Length reported by pipelines created from now on
    pub fn set_length_ms(&self, length_ms: u64) {
        self.lock().length_ms = length_ms;
    }

    /// Number of pipelines constructed so far
    pub fn constructions(&self) -> usize {
        self.lock().records.len()
    }

    pub fn record(&self, id: PipelineId) -> PipelineRecord {
        self.lock()
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .unwrap_or_else(|| panic!("no pipeline {}", id))
    }

    /// Records in construction order
    pub fn records(&self) -> Vec<PipelineRecord> {
        self.lock().records.clone()
    }

    pub fn last(&self) -> PipelineRecord {
        self.lock()
            .records
            .last()
            .cloned()
            .expect("no pipeline constructed")
    }

    pub fn is_released(&self, id: PipelineId) -> bool {
        self.record(id).released
    }

    /// Pipelines not yet released
    pub fn live(&self) -> Vec<PipelineId> {
        self.lock()
            .records
            .iter()
            .filter(|r| !r.released)
            .map(|r| r.id)
            .collect()
    }

    /// Raise an event as if pipeline `id` had sent it
    pub fn emit(&self, id: PipelineId, kind: PipelineEventKind) -> bool {
        let sender = self.lock().senders.get(&id).cloned();
        sender.is_some_and(|s| s.send(kind))
    }

    fn update(&self, id: PipelineId, f: impl FnOnce(&mut PipelineRecord)) {
        let mut state = self.lock();
        if let Some(record) = state.records.iter_mut().find(|r| r.id == id) {
            f(record);
        }
    }
}

pub struct FakePipelineFactory {
    script: Script,
}

impl FakePipelineFactory {
    pub fn new() -> (Self, Script) {
        let script = Script::default();
        script.lock().length_ms = 180_000;
        (
            Self {
                script: script.clone(),
            },
            script,
        )
    }
}

impl PipelineFactory for FakePipelineFactory {
    fn create(&mut self, events: PipelineEventSender) -> Box<dyn MediaPipeline> {
        let id = events.id();
        let length_ms = {
            let mut state = self.script.lock();
            state.records.push(PipelineRecord::new(id));
            state.senders.insert(id, events.clone());
            state.length_ms
        };
        Box::new(FakePipeline {
            id,
            events,
            script: self.script.clone(),
            url: None,
            redirect: None,
            state: PipelineState::Null,
            position_ms: 0,
            length_ms,
        })
    }
}

struct FakePipeline {
    id: PipelineId,
    events: PipelineEventSender,
    script: Script,
    url: Option<Url>,
    redirect: Option<Url>,
    state: PipelineState,
    position_ms: u64,
    length_ms: u64,
}

impl MediaPipeline for FakePipeline {
    fn id(&self) -> PipelineId {
        self.id
    }

    fn set_output_device(&mut self, output: &OutputSettings) {
        let output = output.clone();
        self.script.update(self.id, |r| r.output = Some(output));
    }

    fn set_replay_gain(&mut self, replay_gain: &ReplayGainSettings) {
        let replay_gain = replay_gain.clone();
        self.script
            .update(self.id, |r| r.replay_gain = Some(replay_gain));
    }

    fn init(&mut self, url: &Url) -> Result<()> {
        if self.script.lock().fail_init.contains(url) {
            return Err(Error::Pipeline(format!("no source element for {}", url)));
        }
        self.url = Some(url.clone());
        self.state = PipelineState::Ready;
        let url = url.clone();
        self.script.update(self.id, |r| {
            r.url = Some(url);
            r.state = PipelineState::Ready;
        });
        Ok(())
    }

    fn set_state(&mut self, state: PipelineState) -> Result<()> {
        self.script
            .update(self.id, |r| r.requested_states.push(state));

        if state == PipelineState::Playing {
            let refusal = self
                .url
                .as_ref()
                .and_then(|url| self.script.lock().refuse_play.get(url).cloned());
            if let Some(redirect) = refusal {
                self.redirect = redirect;
                return Err(Error::PlayFailed(format!("{} refused to play", self.id)));
            }
        }

        self.state = state;
        self.script.update(self.id, |r| r.state = state);
        Ok(())
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        self.position_ms = position_ms.min(self.length_ms);
        self.script.update(self.id, |r| r.seeks.push(position_ms));
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        self.position_ms
    }

    fn length_ms(&self) -> u64 {
        self.length_ms
    }

    fn url(&self) -> Option<Url> {
        self.url.clone()
    }

    fn redirect_url(&self) -> Option<Url> {
        self.redirect.clone()
    }

    fn set_volume(&mut self, percent: u8) {
        self.script.update(self.id, |r| r.volume = Some(percent));
    }

    fn set_equalizer_enabled(&mut self, enabled: bool) {
        self.script
            .update(self.id, |r| r.equalizer_enabled = Some(enabled));
    }

    fn set_equalizer_params(&mut self, preamp: i32, band_gains: &[i32]) {
        let band_gains = band_gains.to_vec();
        self.script
            .update(self.id, |r| r.equalizer_params = Some((preamp, band_gains)));
    }

    fn start_fader(&mut self, duration_ms: u64, direction: FadeDirection) {
        self.script
            .update(self.id, |r| r.faders.push((duration_ms, direction)));
    }

    fn add_buffer_consumer(&mut self, consumer: ConsumerRef) {
        self.script.update(self.id, |r| {
            if !r.has_consumer(&consumer) {
                r.consumers.push(consumer);
            }
        });
    }

    fn remove_buffer_consumer(&mut self, consumer: &ConsumerRef) {
        self.script
            .update(self.id, |r| r.consumers.retain(|c| !Weak::ptr_eq(c, consumer)));
    }

    fn remove_all_buffer_consumers(&mut self) {
        self.script.update(self.id, |r| r.consumers.clear());
    }

    fn set_next_url(&mut self, url: &Url) {
        let url = url.clone();
        self.script.update(self.id, |r| r.next_urls.push(url));
    }
}

impl Drop for FakePipeline {
    fn drop(&mut self) {
        if let Ok(mut state) = self.script.inner.lock() {
            if let Some(record) = state.records.iter_mut().find(|r| r.id == self.id) {
                record.released = true;
            }
        }
        self.events.send(PipelineEventKind::Destroyed);
    }
}
