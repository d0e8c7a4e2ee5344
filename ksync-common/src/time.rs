//! SRT timestamp formatting
//!
//! Converts playback positions (seconds) into the `HH:MM:SS,mmm` form used
//! by the SRT subtitle format. Components are truncated, never rounded, so
//! the output stays bit-exact for downstream subtitle consumers.

/// Format a playback position in seconds as an SRT timestamp.
///
/// Negative positions clamp to zero. Hours grow past two digits for
/// positions beyond 99:59:59 rather than wrapping.
///
/// # Examples
///
/// ```
/// use ksync_common::time::format_srt_timestamp;
///
/// assert_eq!(format_srt_timestamp(0.0), "00:00:00,000");
/// assert_eq!(format_srt_timestamp(65.5), "00:01:05,500");
/// assert_eq!(format_srt_timestamp(3661.999), "01:01:01,999");
/// ```
pub fn format_srt_timestamp(seconds: f64) -> String {
    // Truncate to whole milliseconds. The small bias compensates for binary
    // representation error in decimal inputs (3661.999 * 1000 lands a hair
    // below 3661999.0) and stays far below one millisecond.
    let total_millis = if seconds <= 0.0 {
        0u64
    } else {
        (seconds * 1000.0 + 1e-4) as u64
    };

    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}
