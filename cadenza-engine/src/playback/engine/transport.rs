//! Transport control - load, play, pause, stop, seek
//!
//! Also volume, equalizer and buffer-consumer propagation, which all act
//! on the current pipeline.

use super::core::{make_volume_logarithmic, PlaybackEngine};
use crate::consumer::ConsumerRef;
use crate::error::{Error, Result};
use crate::media_url::{missing_local_file, normalize_for_pipeline};
use cadenza_common::events::{EngineEvent, EngineState, FadeDirection, PipelineState, TrackChangeKind};
use tracing::{debug, info, warn};
use url::Url;

impl PlaybackEngine {
    /// Load `url` as the current track
    ///
    /// Crossfades from the old track when one is loaded and crossfading is
    /// enabled for this kind of change. An automatic change to the URL the
    /// current pipeline is already playing (gapless continuation) is a
    /// no-op unless autocrossfade is on.
    ///
    /// # Errors
    /// - `FileNotFound` for a missing local file (no pipeline is built)
    /// - `Pipeline` when the new pipeline cannot be built; an Error event
    ///   is emitted and the old pipeline keeps playing
    pub fn load(&mut self, url: &Url, kind: TrackChangeKind) -> Result<()> {
        let url = normalize_for_pipeline(url)?;

        if let Some(path) = missing_local_file(&url) {
            warn!("Not loading missing file {}", path.display());
            return Err(Error::FileNotFound(path));
        }

        let crossfade = self.current.is_some()
            && match kind {
                TrackChangeKind::Manual => self.settings.crossfade_enabled,
                TrackChangeKind::Auto => self.settings.autocrossfade_enabled,
            };

        if !crossfade && kind == TrackChangeKind::Auto {
            let already_playing = self
                .current
                .as_ref()
                .and_then(|p| p.url())
                .is_some_and(|current| current == url);
            if already_playing {
                debug!("Current pipeline already on {}, not reloading", url);
                self.url = Some(url);
                self.about_to_end_emitted = false;
                return Ok(());
            }
        }

        let pipeline = match self.create_pipeline(&url, true) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                warn!("Failed to load {}: {}", url, e);
                self.emit(EngineEvent::error(e.to_string()));
                return Err(e);
            }
        };
        let new_id = pipeline.id();

        if crossfade {
            self.start_fadeout();
        }

        // Replacing drops the old pipeline unless it went to the fadeout slot
        self.current = Some(pipeline);
        self.url = Some(url.clone());
        self.about_to_end_emitted = false;
        self.apply_audio_settings();

        if crossfade {
            let duration_ms = self.settings.fadeout_duration_ms;
            if let Some(pipeline) = self.current.as_mut() {
                pipeline.start_fader(duration_ms, FadeDirection::Forward);
            }
        }

        info!(
            "Loaded {} on {} ({:?}{})",
            url,
            new_id,
            kind,
            if crossfade { ", crossfading" } else { "" }
        );
        Ok(())
    }

    /// Start the current pipeline, following redirects on failure
    ///
    /// When the pipeline refuses to play but offers a redirect URL different
    /// from its own, it is replaced by a pipeline for the redirect and the
    /// request is retried, up to `max_redirects` times. A non-zero `offset_ms`
    /// is sought to once playing.
    ///
    /// # Errors
    /// - `NoPipeline` if nothing is loaded (no events)
    /// - `PlayFailed`, `Pipeline` or `RedirectLimit` when playback cannot
    ///   start; the current pipeline is released and Error + StateChanged
    ///   (Empty) are emitted
    pub fn play(&mut self, offset_ms: u64) -> Result<()> {
        let Some(mut pipeline) = self.current.take() else {
            return Err(Error::NoPipeline);
        };

        let max_redirects = self.settings.max_redirects;
        let mut hops = 0u32;

        while let Err(e) = pipeline.set_state(PipelineState::Playing) {
            let own_url = pipeline.url();
            let redirect = pipeline
                .redirect_url()
                .filter(|redirect| own_url.as_ref() != Some(redirect));

            let Some(redirect) = redirect else {
                drop(pipeline);
                return Err(self.fail_play(Error::PlayFailed(format!(
                    "Could not start playback of {}: {}",
                    own_url.map_or_else(|| "<unknown>".to_string(), |u| u.to_string()),
                    e
                ))));
            };

            if hops >= max_redirects {
                drop(pipeline);
                return Err(self.fail_play(Error::RedirectLimit {
                    url: redirect.to_string(),
                    hops,
                }));
            }
            hops += 1;

            debug!(
                "{} refused to play, following redirect {} to {}",
                pipeline.id(),
                hops,
                redirect
            );
            drop(pipeline);
            pipeline = match self.create_pipeline(&redirect, true) {
                Ok(pipeline) => pipeline,
                Err(e) => return Err(self.fail_play(e)),
            };
        }

        let id = pipeline.id();
        self.current = Some(pipeline);
        if hops > 0 {
            self.apply_audio_settings();
        }

        if offset_ms > 0 {
            if let Some(pipeline) = self.current.as_mut() {
                if let Err(e) = pipeline.seek(offset_ms) {
                    debug!("Initial seek to {}ms failed: {}", offset_ms, e);
                }
            }
        }

        self.timer.start();
        info!("Playing {} (offset {}ms)", id, offset_ms);
        self.emit_state(EngineState::Playing);
        Ok(())
    }

    fn fail_play(&mut self, error: Error) -> Error {
        self.fail_current(error.to_string());
        error
    }

    /// Pause the current pipeline; no-op unless playing
    pub fn pause(&mut self) -> Result<()> {
        let Some(pipeline) = self.current.as_mut() else {
            return Ok(());
        };
        if pipeline.state() != PipelineState::Playing {
            debug!("Pause ignored in state {:?}", pipeline.state());
            return Ok(());
        }

        pipeline.set_state(PipelineState::Paused)?;
        self.timer.stop();
        info!("Paused {}", pipeline.id());
        self.emit_state(EngineState::Paused);
        Ok(())
    }

    /// Resume a paused pipeline; no-op unless paused
    pub fn unpause(&mut self) -> Result<()> {
        let Some(pipeline) = self.current.as_mut() else {
            return Ok(());
        };
        if pipeline.state() != PipelineState::Paused {
            debug!("Unpause ignored in state {:?}", pipeline.state());
            return Ok(());
        }

        pipeline.set_state(PipelineState::Playing)?;
        self.timer.start();
        info!("Resumed {}", pipeline.id());
        self.emit_state(EngineState::Playing);
        Ok(())
    }

    /// Stop playback, fading out when fadeout is enabled
    ///
    /// Afterwards `state()` reports `Empty`.
    pub fn stop(&mut self) {
        self.timer.stop();
        self.url = None;
        self.about_to_end_emitted = false;

        if self.settings.fadeout_enabled && self.current.is_some() {
            self.start_fadeout();
        }
        if let Some(pipeline) = self.current.take() {
            debug!("Releasing {} on stop", pipeline.id());
        }

        info!("Stopped");
        self.emit_state(EngineState::Empty);
    }

    /// Seek the current pipeline
    pub fn seek(&mut self, position_ms: u64) -> Result<()> {
        let pipeline = self.current.as_mut().ok_or(Error::NoPipeline)?;
        if let Err(e) = pipeline.seek(position_ms) {
            debug!("Seek to {}ms on {} failed: {}", position_ms, pipeline.id(), e);
            return Err(e);
        }
        self.about_to_end_emitted = false;
        Ok(())
    }

    /// Set the main volume (0-100, linear)
    pub fn set_volume(&mut self, percent: u8) {
        self.volume = percent.min(100);
        let curved = make_volume_logarithmic(self.volume);
        debug!("Volume {}% (pipeline {}%)", self.volume, curved);
        if let Some(pipeline) = self.current.as_mut() {
            pipeline.set_volume(curved);
        }
    }

    pub fn set_equalizer_enabled(&mut self, enabled: bool) {
        self.equalizer_enabled = enabled;
        if let Some(pipeline) = self.current.as_mut() {
            pipeline.set_equalizer_enabled(enabled);
        }
    }

    pub fn set_equalizer_parameters(&mut self, preamp: i32, band_gains: Vec<i32>) {
        self.equalizer_preamp = preamp;
        self.equalizer_gains = band_gains;
        if let Some(pipeline) = self.current.as_mut() {
            pipeline.set_equalizer_params(self.equalizer_preamp, &self.equalizer_gains);
        }
    }

    /// Register a buffer consumer with the engine and the current pipeline
    pub fn add_buffer_consumer(&mut self, consumer: ConsumerRef) {
        if self.buffer_consumers.add(consumer.clone()) {
            self.attach_consumer_to_current(consumer);
        }
    }

    /// Unregister a buffer consumer from the engine and the current pipeline
    pub fn remove_buffer_consumer(&mut self, consumer: &ConsumerRef) {
        self.buffer_consumers.remove(consumer);
        if let Some(pipeline) = self.current.as_mut() {
            pipeline.remove_buffer_consumer(consumer);
        }
    }

    /// Queue the next track on the current pipeline for gapless playback
    ///
    /// Skipped when autocrossfade is on, since the next track then gets its
    /// own pipeline.
    pub fn preload_next(&mut self, url: &Url) -> Result<()> {
        if self.settings.autocrossfade_enabled {
            debug!("Autocrossfade on, not preloading {}", url);
            return Ok(());
        }
        let url = normalize_for_pipeline(url)?;
        if let Some(pipeline) = self.current.as_mut() {
            debug!("Preloading {} on {}", url, pipeline.id());
            pipeline.set_next_url(&url);
        }
        Ok(())
    }
}
