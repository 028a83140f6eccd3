//! Test helpers for cadenza-engine integration tests
//!
//! - FakePipelineFactory: scripted pipelines that record every call
//! - engine builders and event collection

#![allow(dead_code, unused_imports)]

pub mod fake_pipeline;

pub use fake_pipeline::{FakePipelineFactory, PipelineRecord, Script};

use cadenza_common::config::EngineSettings;
use cadenza_common::events::{EngineEvent, EngineState, EventBus};
use cadenza_engine::pipeline::PipelineEvent;
use cadenza_engine::PlaybackEngine;
use tokio::sync::{broadcast, mpsc};
use url::Url;

pub struct TestEngine {
    pub engine: PlaybackEngine,
    pub pipelines: Script,
    pub events: broadcast::Receiver<EngineEvent>,
    /// Kept alive so pipelines can still report while a test runs
    pub pipeline_events: mpsc::UnboundedReceiver<PipelineEvent>,
}

impl TestEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let (factory, pipelines) = FakePipelineFactory::new();
        Self::with_factory(factory, pipelines, settings)
    }

    pub fn with_factory(factory: FakePipelineFactory, pipelines: Script, settings: EngineSettings) -> Self {
        let bus = EventBus::new(256);
        let events = bus.subscribe();
        let (engine, pipeline_events) = PlaybackEngine::new(Box::new(factory), settings, bus);
        Self {
            engine,
            pipelines,
            events,
            pipeline_events,
        }
    }

    /// Drain and return every event emitted so far
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }

    /// Variant names of every event emitted so far
    pub fn take_event_types(&mut self) -> Vec<&'static str> {
        self.take_events().iter().map(EngineEvent::event_type).collect()
    }

    /// States reported by StateChanged events emitted so far
    pub fn take_states(&mut self) -> Vec<EngineState> {
        self.take_events()
            .into_iter()
            .filter_map(|event| match event {
                EngineEvent::StateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

pub fn crossfade_settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.crossfade_enabled = true;
    settings.fadeout_duration_ms = 1500;
    settings
}
