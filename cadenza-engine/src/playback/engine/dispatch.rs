//! Pipeline event routing and polling-timer ticks
//!
//! Events are routed by sender identity. The current pipeline drives
//! caller-facing events, the fadeout pipeline only ever gets released, and
//! background streams loop or drop out silently. Anything else comes from
//! a pipeline that has already been replaced and is ignored.

use super::core::PlaybackEngine;
use crate::pipeline::{PipelineEvent, PipelineEventKind, PipelineId};
use cadenza_common::events::EngineEvent;
use tracing::{debug, info, trace};

/// Slack added to the about-to-end window on top of gap and poll period
const ABOUT_TO_END_MARGIN_MS: u64 = 100;

impl PlaybackEngine {
    /// Handle one event raised by a pipeline
    pub fn handle_pipeline_event(&mut self, event: PipelineEvent) {
        let PipelineEvent { source, kind } = event;

        if self.current_pipeline_id() == Some(source) {
            self.on_current_event(source, kind);
        } else if self.fadeout_pipeline_id() == Some(source) {
            match kind {
                PipelineEventKind::FaderFinished => self.fadeout_finished(),
                other => trace!("Ignoring {:?} from fading {}", other, source),
            }
        } else if let Some(id) = self.background_stream_for(source) {
            match kind {
                PipelineEventKind::EndOfStream { .. } => self.restart_background_stream(id),
                PipelineEventKind::Error(message) => self.background_stream_failed(id, &message),
                other => trace!("Ignoring {:?} from background stream {}", other, id),
            }
        } else {
            trace!("Ignoring {:?} from stale {}", kind, source);
        }
    }

    fn on_current_event(&mut self, source: PipelineId, kind: PipelineEventKind) {
        match kind {
            PipelineEventKind::EndOfStream { has_next_track } => {
                if has_next_track {
                    debug!("{} continued into its next URL", source);
                } else {
                    debug!("{} reached end of stream", source);
                    self.current = None;
                    self.timer.stop();
                }
                self.about_to_end_emitted = false;
                info!("Track ended");
                self.emit(EngineEvent::track_ended());
            }
            PipelineEventKind::Error(message) => {
                self.fail_current(format!("Playback error on {}: {}", source, message));
            }
            PipelineEventKind::MetadataFound(bundle) => {
                trace!("Metadata from {}: {:?}", source, bundle);
                self.emit(EngineEvent::metadata(bundle));
            }
            PipelineEventKind::FaderFinished | PipelineEventKind::Destroyed => {
                trace!("{:?} from current {}", kind, source);
            }
        }
    }

    /// Polling-timer callback: report position, warn of the track ending
    pub fn on_timer_tick(&mut self) {
        let Some(pipeline) = self.current.as_ref() else {
            return;
        };
        let position_ms = pipeline.position_ms();
        let length_ms = pipeline.length_ms();
        self.emit(EngineEvent::tick(position_ms, length_ms));

        if length_ms == 0 || self.about_to_end_emitted {
            return;
        }

        let gap_ms = if self.settings.autocrossfade_enabled {
            self.settings.fadeout_duration_ms
        } else {
            self.settings.preload_gap_ms
        };
        let window_ms = gap_ms
            .saturating_add(self.settings.poll_interval_ms)
            .saturating_add(ABOUT_TO_END_MARGIN_MS);
        let remaining_ms = length_ms.saturating_sub(position_ms);

        if remaining_ms < window_ms {
            debug!("{}ms remaining, track about to end", remaining_ms);
            self.about_to_end_emitted = true;
            self.emit(EngineEvent::track_about_to_end());
        }
    }

    /// Wait for the polling timer, then handle the tick
    ///
    /// Pends forever while the timer is stopped. Cancel safe.
    pub async fn timer_tick(&mut self) {
        self.timer.tick().await;
        self.on_timer_tick();
    }
}
