//! Fade-out sequencing
//!
//! The outgoing pipeline moves to the fadeout slot, loses its buffer
//! consumers and fades to silence. Only its FaderFinished is honoured from
//! then on (see `dispatch.rs`), which releases it.

use super::core::PlaybackEngine;
use cadenza_common::events::FadeDirection;
use tracing::debug;

impl PlaybackEngine {
    /// Move the current pipeline into the fadeout slot and fade it out
    ///
    /// A pipeline still fading from an earlier transition is released
    /// first, so at most one fadeout pipeline is ever alive.
    pub(super) fn start_fadeout(&mut self) {
        let Some(mut pipeline) = self.current.take() else {
            return;
        };

        pipeline.remove_all_buffer_consumers();
        pipeline.start_fader(self.settings.fadeout_duration_ms, FadeDirection::Backward);
        debug!(
            "Fading out {} over {}ms",
            pipeline.id(),
            self.settings.fadeout_duration_ms
        );

        if let Some(previous) = self.fadeout.replace(pipeline) {
            debug!("Releasing {} before its fade-out finished", previous.id());
        }
    }

    /// Release the fadeout pipeline once its fader has run out
    pub(super) fn fadeout_finished(&mut self) {
        if let Some(pipeline) = self.fadeout.take() {
            debug!("Fade-out of {} finished, releasing", pipeline.id());
        }
    }
}
