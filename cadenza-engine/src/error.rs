//! Error types for cadenza-engine
//!
//! Engine operations return these; the failures the player controller must
//! also see asynchronously are additionally broadcast as
//! `EngineEvent::Error`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug)]
pub enum Error {
    /// Local file named by a `file://` URL does not exist
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Pipeline could not be constructed or initialised for a URL
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Pipeline refused to enter the playing state
    #[error("Playback error: {0}")]
    PlayFailed(String),

    /// Play gave up following a redirect chain
    #[error("Redirect limit reached after {hops} hops (last redirect: {url})")]
    RedirectLimit { url: String, hops: u32 },

    /// Operation needs a loaded pipeline
    #[error("No pipeline loaded")]
    NoPipeline,

    /// URL scheme no pipeline can handle
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Location could not be parsed as a URL or path
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Stream probing failed (unknown container, no audio track)
    #[error("Probe error: {0}")]
    Probe(String),

    /// The engine task is gone (shut down or panicked)
    #[error("Engine stopped")]
    EngineStopped,

    /// Settings and other shared-crate errors
    #[error(transparent)]
    Common(#[from] cadenza_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
