//! ksync-engine specific configuration

use crate::input::Key;
use std::path::PathBuf;

/// Synchronization run configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Lyric text file to synchronize
    pub lyrics_path: PathBuf,
    /// Length of the backing track, in seconds
    pub playback_duration_secs: f64,
    /// Destination SRT file
    pub output_path: PathBuf,
    /// Key that registers a line against the clock
    pub tap_key: Key,
}
