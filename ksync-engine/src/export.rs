//! Timeline export to the SRT subtitle format
//!
//! One block per timeline entry, in insertion order:
//!
//! ```text
//! <sequence number, 1-based>
//! <start> --> <end>
//! <lyric line text>
//! <blank line>
//! ```
//!
//! The end of each range is the captured time plus a fixed display
//! duration.

use crate::error::{Error, Result};
use crate::session::TimelineEntry;
use ksync_common::time::format_srt_timestamp;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Display duration of each subtitle block, in seconds.
pub const LINE_DISPLAY_SECS: f64 = 2.0;

/// Render timeline entries as SRT text.
pub fn render_srt(entries: &[TimelineEntry], lines: &[String]) -> Result<String> {
    let mut out = String::new();
    for (seq, entry) in entries.iter().enumerate() {
        let text = lines.get(entry.line_index).ok_or_else(|| {
            Error::Export(format!(
                "timeline references line {} but the sheet has {} lines",
                entry.line_index,
                lines.len()
            ))
        })?;
        let start = format_srt_timestamp(entry.captured_secs);
        let end = format_srt_timestamp(entry.captured_secs + LINE_DISPLAY_SECS);
        out.push_str(&format!("{}\n{} --> {}\n{}\n\n", seq + 1, start, end, text));
    }
    Ok(out)
}

/// Write timeline entries to `path` as an SRT file.
///
/// The destination directory is created if missing. The file is rendered in
/// full before any I/O, written to a sibling temp file, and renamed over
/// `path`, so an existing file is either fully replaced or left untouched.
pub fn write_srt(entries: &[TimelineEntry], lines: &[String], path: &Path) -> Result<()> {
    if entries.is_empty() {
        return Err(Error::Export("no synchronized lines to export".to_string()));
    }

    let rendered = render_srt(entries, lines)?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let tmp = temp_path(path);
    fs::write(&tmp, rendered.as_bytes())?;
    fs::rename(&tmp, path)?;

    info!(
        "Exported {} subtitle blocks to {}",
        entries.len(),
        path.display()
    );
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("export"));
    name.push(".tmp");
    path.with_file_name(name)
}
