//! Background streams
//!
//! Looping ambient streams (rain, a radio station under the music) that
//! play beside the main track. They get a fixed volume, no buffer
//! consumers, and none of their events reach the caller.

use super::core::PlaybackEngine;
use crate::error::{Error, Result};
use crate::media_url::{missing_local_file, normalize_for_pipeline};
use crate::pipeline::PipelineId;
use cadenza_common::events::PipelineState;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

/// Identifier handed out by `add_background_stream`
///
/// Allocated from 0 upwards and never reused by one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BackgroundStreamId(u32);

impl BackgroundStreamId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BackgroundStreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PlaybackEngine {
    /// Start a looping background stream
    ///
    /// # Errors
    /// Fails without allocating an id when the pipeline cannot be built or
    /// refuses to play. Main playback is never affected.
    pub fn add_background_stream(&mut self, url: &Url) -> Result<BackgroundStreamId> {
        let url = normalize_for_pipeline(url)?;
        if let Some(path) = missing_local_file(&url) {
            warn!("Background stream file {} not found", path.display());
            return Err(Error::FileNotFound(path));
        }

        let mut pipeline = self.create_pipeline(&url, false).map_err(|e| {
            warn!("Failed to create background stream for {}: {}", url, e);
            e
        })?;
        pipeline.set_volume(self.settings.background_volume);
        pipeline.set_next_url(&url);

        if let Err(e) = pipeline.set_state(PipelineState::Playing) {
            warn!("Background stream {} refused to play: {}", url, e);
            return Err(e);
        }

        let id = BackgroundStreamId(self.next_background_id);
        self.next_background_id += 1;
        info!("Background stream {} playing {} on {}", id, url, pipeline.id());
        self.background_streams.insert(id, pipeline);
        Ok(id)
    }

    /// Stop and release a background stream; unknown ids are ignored
    pub fn stop_background_stream(&mut self, id: BackgroundStreamId) {
        match self.background_streams.remove(&id) {
            Some(pipeline) => info!("Stopping background stream {} ({})", id, pipeline.id()),
            None => debug!("No background stream {}", id),
        }
    }

    pub fn background_stream_ids(&self) -> Vec<BackgroundStreamId> {
        self.background_streams.keys().copied().collect()
    }

    pub(super) fn background_stream_for(&self, source: PipelineId) -> Option<BackgroundStreamId> {
        self.background_streams
            .iter()
            .find(|(_, pipeline)| pipeline.id() == source)
            .map(|(id, _)| *id)
    }

    /// Point a finished background stream back at its own URL
    pub(super) fn restart_background_stream(&mut self, id: BackgroundStreamId) {
        if let Some(pipeline) = self.background_streams.get_mut(&id) {
            match pipeline.url() {
                Some(url) => {
                    debug!("Looping background stream {} ({})", id, url);
                    pipeline.set_next_url(&url);
                }
                None => warn!("Background stream {} has no URL to loop", id),
            }
        }
    }

    /// Drop a background stream whose pipeline failed
    pub(super) fn background_stream_failed(&mut self, id: BackgroundStreamId, message: &str) {
        warn!("Background stream {} failed: {}", id, message);
        self.background_streams.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::super::core::test_support::StubFactory;
    use super::*;
    use cadenza_common::config::EngineSettings;
    use cadenza_common::events::EventBus;

    #[test]
    fn test_ids_are_sequential_and_stop_is_targeted() {
        let (factory, log) = StubFactory::new();
        let (mut engine, _rx) =
            PlaybackEngine::new(Box::new(factory), EngineSettings::default(), EventBus::new(16));
        let rain = Url::parse("http://example.com/rain.ogg").unwrap();

        let first = engine.add_background_stream(&rain).unwrap();
        let second = engine.add_background_stream(&rain).unwrap();
        assert_eq!(first.as_u32(), 0);
        assert_eq!(second.as_u32(), 1);

        engine.stop_background_stream(first);
        engine.stop_background_stream(BackgroundStreamId::new(7));
        assert_eq!(engine.background_stream_ids(), vec![second]);

        let log = log.lock().unwrap();
        assert_eq!(log.released.len(), 1);
        // Fixed background volume, no curve
        assert!(log.volumes.iter().all(|(_, v)| *v == 30));
        assert!(log.consumers.is_empty());
    }

    #[test]
    fn test_failed_stream_gets_no_id() {
        let (mut factory, _log) = StubFactory::new();
        factory.fail_play = true;
        let (mut engine, _rx) =
            PlaybackEngine::new(Box::new(factory), EngineSettings::default(), EventBus::new(16));
        let rain = Url::parse("http://example.com/rain.ogg").unwrap();

        assert!(engine.add_background_stream(&rain).is_err());
        assert!(engine.background_stream_ids().is_empty());
        assert_eq!(engine.next_background_id, 0);
    }
}
