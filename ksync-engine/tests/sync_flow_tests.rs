//! End-to-end synchronization flow tests
//!
//! Exercises the public API the way the CLI wires it together: a queued key
//! source driving the multiplexer, a scripted playback clock, and the engine
//! exporting the finished timeline.

use ksync_common::events::SyncEvent;
use ksync_engine::clock::PlaybackClock;
use ksync_engine::input::{Key, KeyMultiplexer, KeyStateSource, QueuedKeySource};
use ksync_engine::session::SyncPhase;
use ksync_engine::SyncEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// Clock with scripted position and playback state.
struct ScriptedClock {
    playing: AtomicBool,
    position: Mutex<f64>,
}

impl ScriptedClock {
    fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            position: Mutex::new(0.0),
        }
    }

    fn set_position(&self, secs: f64) {
        *self.position.lock().unwrap() = secs;
    }

    fn end_playback(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}

impl PlaybackClock for ScriptedClock {
    fn play(&self) {
        self.playing.store(true, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn position_secs(&self) -> f64 {
        *self.position.lock().unwrap()
    }

    fn stop_and_release(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}

struct Rig {
    source: Arc<QueuedKeySource>,
    mux: Arc<KeyMultiplexer>,
    clock: Arc<ScriptedClock>,
    engine: SyncEngine,
}

fn rig(tap_key: Key) -> Rig {
    let source = Arc::new(QueuedKeySource::new());
    let mux = Arc::new(KeyMultiplexer::new(
        Arc::clone(&source) as Arc<dyn KeyStateSource>
    ));
    let clock = Arc::new(ScriptedClock::new());
    let engine = SyncEngine::new(Arc::clone(&mux), tap_key, 100);
    Rig { source, mux, clock, engine }
}

impl Rig {
    async fn tap_at(&self, key: Key, secs: f64) {
        self.clock.set_position(secs);
        self.source.push(key);
        self.mux.tick();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn lines(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn full_session_exports_expected_srt() {
    let r = rig(Key::Space);
    let mut events = r.engine.events().subscribe();

    r.engine
        .start(lines(&["a", "b", "c"]), r.clock.clone())
        .await;
    assert_eq!(r.engine.phase().await, SyncPhase::Synchronizing);

    r.tap_at(Key::Space, 1.2).await;
    r.tap_at(Key::Space, 4.5).await;
    r.tap_at(Key::Space, 8.0).await;

    // Final tap finishes the session directly, before playback ends
    assert_eq!(r.engine.phase().await, SyncPhase::Finished);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("song.srt");
    r.engine.export_timeline(&path).await;

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        content,
        "1\n00:00:01,200 --> 00:00:03,200\na\n\n\
         2\n00:00:04,500 --> 00:00:06,500\nb\n\n\
         3\n00:00:08,000 --> 00:00:10,000\nc\n\n"
    );

    // Exporting again overwrites with byte-identical output
    r.engine.export_timeline(&path).await;
    assert_eq!(std::fs::read_to_string(&path).unwrap(), content);

    let mut got_finished = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::SyncFinished { .. }) {
            assert!(!got_finished, "SyncFinished emitted more than once");
            got_finished = true;
        }
    }
    assert!(got_finished);
}

#[tokio::test]
async fn taps_on_other_keys_are_not_registered() {
    let r = rig(Key::Space);
    r.engine.start(lines(&["a", "b"]), r.clock.clone()).await;

    r.tap_at(Key::Enter, 1.0).await;
    assert!(r.engine.session().timeline_entries().await.is_empty());

    r.tap_at(Key::Space, 2.0).await;
    assert_eq!(r.engine.session().timeline_entries().await.len(), 1);
}

#[tokio::test]
async fn playback_end_finishes_partial_session() {
    let r = rig(Key::Space);
    r.engine
        .start(lines(&["a", "b", "c", "d"]), r.clock.clone())
        .await;

    r.tap_at(Key::Space, 1.0).await;
    r.tap_at(Key::Space, 2.5).await;

    r.clock.end_playback();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(r.engine.phase().await, SyncPhase::Finished);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.srt");
    r.engine.export_timeline(&path).await;

    let content = std::fs::read_to_string(&path).unwrap();
    // Two blocks of four physical lines each, plus the trailing newline
    assert_eq!(content.split('\n').count(), 4 * 2 + 1);
    assert!(content.starts_with("1\n00:00:01,000 --> 00:00:03,000\na\n"));
}

#[tokio::test]
async fn cancelled_session_stops_and_keeps_prior_entries() {
    let r = rig(Key::Space);
    let mut events = r.engine.events().subscribe();

    r.engine
        .start(lines(&["a", "b", "c"]), r.clock.clone())
        .await;
    r.tap_at(Key::Space, 1.0).await;

    r.engine.cancel().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(r.engine.phase().await, SyncPhase::Stopped);

    // Cancellation took effect; later taps change nothing
    r.tap_at(Key::Space, 5.0).await;
    assert_eq!(r.engine.session().timeline_entries().await.len(), 1);

    let mut got_stopped = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::SyncStopped { .. }) {
            got_stopped = true;
        }
    }
    assert!(got_stopped);

    r.engine.dispose().await;
    r.engine.dispose().await;
}
