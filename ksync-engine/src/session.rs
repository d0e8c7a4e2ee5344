//! Synchronization session state
//!
//! Owns the lyric lines, the line cursor, and the append-only timeline for
//! one synchronization attempt. Sessions are single-use: once a terminal
//! phase is reached, a new session must be constructed to retry.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session lifecycle phase.
///
/// `Idle → Synchronizing → {Finished, Stopped}`; both `Finished` and
/// `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Synchronizing,
    Finished,
    Stopped,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Idle => write!(f, "idle"),
            SyncPhase::Synchronizing => write!(f, "synchronizing"),
            SyncPhase::Finished => write!(f, "finished"),
            SyncPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// One recorded (playback time, lyric line) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Playback position captured at the tap, in seconds
    pub captured_secs: f64,

    /// Index of the lyric line the tap registered
    pub line_index: usize,
}

/// Ordered, append-only sequence of timeline entries.
///
/// Entries are addressed by insertion order, not keyed by time, so two taps
/// landing on an identical clock value cannot overwrite each other.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next entry.
    ///
    /// Invariants held by construction: `line_index` equals the current
    /// length, and `captured_secs` never decreases (playback time is
    /// monotonic and taps occur in real time).
    pub(crate) fn push(&mut self, entry: TimelineEntry) {
        debug_assert_eq!(entry.line_index, self.entries.len());
        debug_assert!(self
            .entries
            .last()
            .map_or(true, |last| entry.captured_secs >= last.captured_secs));
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TimelineEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of offering a tap to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    /// Session is not synchronizing; the tap was ignored
    Ignored,

    /// A line was registered against the playback clock
    Registered {
        /// Index of the line that was registered
        line_index: usize,
        /// Whether this tap registered the final line (session finished)
        finished: bool,
    },
}

/// State for one synchronization attempt.
///
/// The lyric line sequence is fixed at construction; the cursor starts
/// before the first line and advances by one per tap.
#[derive(Debug)]
pub struct SyncSession {
    session_id: Uuid,
    lines: Vec<String>,
    cursor: Option<usize>,
    timeline: Timeline,
    phase: SyncPhase,
}

impl SyncSession {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            lines,
            cursor: None,
            timeline: Timeline::new(),
            phase: SyncPhase::Idle,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Begin synchronizing. Returns false if the session already left
    /// `Idle`.
    pub fn begin(&mut self) -> bool {
        if self.phase != SyncPhase::Idle {
            return false;
        }
        self.cursor = None;
        self.timeline = Timeline::new();
        self.phase = SyncPhase::Synchronizing;
        true
    }

    /// Register a tap at the given playback position.
    ///
    /// Advances the cursor and appends a timeline entry. Registering the
    /// final line transitions the session to `Finished`, so the timeline
    /// can never outgrow the lyric sheet.
    pub fn register_tap(&mut self, position_secs: f64) -> TapOutcome {
        if self.phase != SyncPhase::Synchronizing {
            return TapOutcome::Ignored;
        }

        let next = self.cursor.map_or(0, |c| c + 1);
        if next >= self.lines.len() {
            return TapOutcome::Ignored;
        }

        self.cursor = Some(next);
        self.timeline.push(TimelineEntry {
            captured_secs: position_secs,
            line_index: next,
        });

        let finished = next + 1 == self.lines.len();
        if finished {
            self.phase = SyncPhase::Finished;
        }

        TapOutcome::Registered {
            line_index: next,
            finished,
        }
    }

    /// Transition to `Finished`. Returns true only when the session was
    /// `Synchronizing`, making the transition exactly-once no matter how
    /// many completion triggers observe the same condition.
    pub fn finish(&mut self) -> bool {
        if self.phase != SyncPhase::Synchronizing {
            return false;
        }
        self.phase = SyncPhase::Finished;
        true
    }

    /// Transition to `Stopped`. Returns true only when the session was
    /// `Synchronizing`.
    pub fn stop(&mut self) -> bool {
        if self.phase != SyncPhase::Synchronizing {
            return false;
        }
        self.phase = SyncPhase::Stopped;
        true
    }
}
