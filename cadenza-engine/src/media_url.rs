//! Media locations
//!
//! Callers hand the engine either URLs (`file://`, `http://`, ...) or plain
//! filesystem paths. Everything is normalised to `url::Url` before it
//! reaches a pipeline.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::trace;
use url::Url;

/// Parse a user-supplied location into a URL
///
/// Anything that does not parse as an absolute URL is treated as a
/// filesystem path, resolved against the current directory when relative.
/// Single-letter schemes are Windows drive letters, not URLs.
pub fn parse_location(input: &str) -> Result<Url> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::Common(cadenza_common::Error::InvalidInput(
            "empty media location".to_string(),
        )));
    }

    match Url::parse(input) {
        Ok(url) if url.scheme().len() > 1 => Ok(url),
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => path_to_url(Path::new(input)),
        Err(e) => Err(e.into()),
    }
}

/// Convert a filesystem path into a `file://` URL
pub fn path_to_url(path: &Path) -> Result<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute).map_err(|_| {
        Error::Common(cadenza_common::Error::InvalidInput(format!(
            "not a usable file path: {}",
            absolute.display()
        )))
    })
}

/// Whether the URL names a local file
pub fn is_local_file(url: &Url) -> bool {
    url.scheme() == "file"
}

/// Filesystem path of a `file://` URL
pub fn local_path(url: &Url) -> Option<PathBuf> {
    if is_local_file(url) {
        url.to_file_path().ok()
    } else {
        None
    }
}

/// Rewrite a URL into the form pipelines expect
///
/// A `file://host/share/file` URL (a network share) becomes a host-less URL
/// whose path is `//host/share/file`, which is what file sources accept.
/// All other URLs pass through unchanged.
pub fn normalize_for_pipeline(url: &Url) -> Result<Url> {
    match url.host_str() {
        Some(host) if is_local_file(url) && !host.is_empty() => {
            let munged = Url::parse(&format!("file:////{}{}", host, url.path()))?;
            trace!("Rewrote share URL {} -> {}", url, munged);
            Ok(munged)
        }
        _ => Ok(url.clone()),
    }
}

/// Path of a local file URL whose file does not exist
///
/// Returns `None` for existing files and for non-file URLs.
pub fn missing_local_file(url: &Url) -> Option<PathBuf> {
    local_path(url).filter(|path| !path.exists())
}
