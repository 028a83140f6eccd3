//! Stream probing using symphonia
//!
//! Reads just enough of a local file to learn its length and tags; no
//! audio is decoded.

use crate::error::{Error, Result};
use cadenza_common::events::MetaBundle;
use std::path::Path;
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use tracing::debug;

/// What a probe learned about a file
#[derive(Debug, Clone, Default)]
pub struct ProbeInfo {
    pub length_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub metadata: MetaBundle,
}

/// Probe a local audio file
///
/// # Errors
/// - File cannot be opened
/// - Container not recognised
/// - No audio track
pub fn probe_file(path: &Path) -> Result<ProbeInfo> {
    debug!("Probing {}", path.display());

    let file = std::fs::File::open(path)?;
    let file_bytes = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Create a hint to help the format registry guess the format
    let mut hint = Hint::new();
    if let Some(ext_str) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext_str);
    }

    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Probe(format!("{}: {}", path.display(), e)))?;

    let (length_ms, sample_rate, channels) = {
        let track = probed
            .format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Probe(format!("{}: no audio track", path.display())))?;
        let params = &track.codec_params;

        let length_ms = match (params.time_base, params.n_frames) {
            (Some(time_base), Some(frames)) => {
                let time = time_base.calc_time(frames);
                time.seconds * 1000 + (time.frac * 1000.0) as u64
            }
            (None, Some(frames)) => match params.sample_rate {
                Some(rate) if rate > 0 => frames * 1000 / rate as u64,
                _ => 0,
            },
            _ => 0,
        };
        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
        (length_ms, params.sample_rate.unwrap_or(0), channels)
    };

    let mut metadata = MetaBundle {
        samplerate: sample_rate,
        length_ms,
        ..MetaBundle::default()
    };
    if length_ms > 0 {
        // kbit/s = bits / ms
        metadata.bitrate = (file_bytes * 8 / length_ms) as u32;
    }

    // Tags may live in the container (Vorbis comments, MP4 atoms) or in a
    // side block found while probing (ID3v2)
    if let Some(revision) = probed.format.metadata().current() {
        apply_tags(revision, &mut metadata);
    }
    if let Some(mut side) = probed.metadata.get() {
        if let Some(revision) = side.skip_to_latest() {
            apply_tags(revision, &mut metadata);
        }
    }

    debug!(
        "Probed {}: {}ms, {}Hz, {} channels",
        path.display(),
        length_ms,
        sample_rate,
        channels
    );

    Ok(ProbeInfo {
        length_ms,
        sample_rate,
        channels,
        metadata,
    })
}

/// Copy the standard tags we report into the bundle, keeping values
/// already set by an earlier revision
fn apply_tags(revision: &MetadataRevision, bundle: &mut MetaBundle) {
    for tag in revision.tags() {
        let Some(key) = tag.std_key else { continue };
        let slot = match key {
            StandardTagKey::TrackTitle => &mut bundle.title,
            StandardTagKey::Artist => &mut bundle.artist,
            StandardTagKey::Album => &mut bundle.album,
            StandardTagKey::Comment => &mut bundle.comment,
            StandardTagKey::Genre => &mut bundle.genre,
            StandardTagKey::Date => &mut bundle.year,
            StandardTagKey::TrackNumber => &mut bundle.tracknr,
            _ => continue,
        };
        if slot.is_empty() {
            *slot = tag.value.to_string();
        }
    }
}
