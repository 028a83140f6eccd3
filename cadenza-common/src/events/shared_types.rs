//! Shared event payload types

use serde::{Deserialize, Serialize};

/// Track metadata discovered by a pipeline while streaming
///
/// Fields are left at their defaults when the stream does not carry them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaBundle {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub comment: String,
    pub genre: String,
    pub year: String,
    pub tracknr: String,
    /// Stream bitrate in kbit/s (0 if unknown)
    pub bitrate: u32,
    /// Sample rate in Hz (0 if unknown)
    pub samplerate: u32,
    /// Length in milliseconds (0 if unknown, e.g. live streams)
    pub length_ms: u64,
}

impl MetaBundle {
    /// True when no field carries information
    pub fn is_empty(&self) -> bool {
        *self == MetaBundle::default()
    }
}
