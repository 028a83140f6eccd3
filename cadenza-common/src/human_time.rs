//! Human-readable time formatting
//!
//! Positions and lengths travel through the engine as milliseconds; these
//! helpers render them for log lines and the CLI status display.

/// Lengths at or above this are shown with an hour field
const HOUR_MS: u64 = 3_600_000;

/// Format milliseconds as `M:SS`, or `H:MM:SS` for an hour or more.
///
/// # Examples
///
/// ```
/// use cadenza_common::human_time::format_ms;
///
/// assert_eq!(format_ms(0), "0:00");
/// assert_eq!(format_ms(65_400), "1:05");
/// assert_eq!(format_ms(3_723_000), "1:02:03");
/// ```
pub fn format_ms(ms: u64) -> String {
    let total_secs = ms / 1000;
    let secs = total_secs % 60;
    if ms >= HOUR_MS {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", total_secs / 60, secs)
    }
}

/// Format a position against a length as `pos / len`.
///
/// A zero length (live streams, unknown duration) renders as `--:--`.
///
/// # Examples
///
/// ```
/// use cadenza_common::human_time::format_progress;
///
/// assert_eq!(format_progress(30_000, 180_000), "0:30 / 3:00");
/// assert_eq!(format_progress(30_000, 0), "0:30 / --:--");
/// ```
pub fn format_progress(position_ms: u64, length_ms: u64) -> String {
    let length = if length_ms == 0 {
        "--:--".to_string()
    } else {
        format_ms(length_ms)
    };
    format!("{} / {}", format_ms(position_ms), length)
}
