//! Playback clock capability
//!
//! The engine never decodes or plays audio itself; it consumes playback
//! through this narrow capability. The position is always read fresh from
//! the clock at the moment of a tap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Playback clock consumed by the synchronization engine.
///
/// Implementations are expected to report a monotonically non-decreasing
/// position while playing.
pub trait PlaybackClock: Send + Sync {
    /// Begin playback from the start of the track.
    fn play(&self);

    /// Whether playback is still in progress.
    fn is_playing(&self) -> bool;

    /// Current playback position in seconds.
    fn position_secs(&self) -> f64;

    /// Stop playback and release the underlying resource.
    fn stop_and_release(&self);
}

/// Wall-clock simulation of a track with a known duration.
///
/// Used by the CLI, which synchronizes against real time while the actual
/// audio plays elsewhere. Position advances from the `play()` call and
/// saturates at the track duration.
pub struct WallClock {
    duration: Duration,
    started_at: Mutex<Option<Instant>>,
    released: AtomicBool,
}

impl WallClock {
    /// Create a clock for a track of the given duration.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started_at: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    /// Track duration this clock simulates.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn started(&self) -> MutexGuard<'_, Option<Instant>> {
        self.started_at.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PlaybackClock for WallClock {
    fn play(&self) {
        *self.started() = Some(Instant::now());
    }

    fn is_playing(&self) -> bool {
        if self.released.load(Ordering::SeqCst) {
            return false;
        }
        match *self.started() {
            Some(started) => started.elapsed() < self.duration,
            None => false,
        }
    }

    fn position_secs(&self) -> f64 {
        match *self.started() {
            Some(started) => started.elapsed().min(self.duration).as_secs_f64(),
            None => 0.0,
        }
    }

    fn stop_and_release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_not_playing_before_play() {
        let clock = WallClock::new(Duration::from_secs(10));
        assert!(!clock.is_playing());
        assert_eq!(clock.position_secs(), 0.0);
    }

    #[test]
    fn test_position_advances_while_playing() {
        let clock = WallClock::new(Duration::from_secs(10));
        clock.play();
        assert!(clock.is_playing());

        sleep(Duration::from_millis(20));
        assert!(clock.position_secs() >= 0.02);
    }

    #[test]
    fn test_playback_ends_at_duration() {
        let clock = WallClock::new(Duration::from_millis(10));
        clock.play();

        sleep(Duration::from_millis(30));
        assert!(!clock.is_playing());
        // Position saturates at the duration
        assert_eq!(clock.position_secs(), 0.010);
    }

    #[test]
    fn test_stop_and_release_ends_playback() {
        let clock = WallClock::new(Duration::from_secs(10));
        clock.play();
        assert!(clock.is_playing());

        clock.stop_and_release();
        assert!(!clock.is_playing());
    }
}
