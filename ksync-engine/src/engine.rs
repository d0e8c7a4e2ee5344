//! Synchronization engine
//!
//! Drives one synchronization session: starts playback, consumes tap events
//! from the key multiplexer, appends timeline entries, watches for playback
//! end, and exports the recorded timeline.
//!
//! # Concurrency model
//!
//! All session mutation happens on one cooperative task: a `tokio::select!`
//! loop over the tap channel, a ~100ms playback poll, and a cancellation
//! watch channel. Taps are delivered in order; cancellation takes effect at
//! the next select boundary, never mid-mutation. The phase transition under
//! the session write lock is the single source of truth for completion, so
//! `SyncFinished` fires exactly once even when the tap path and the
//! playback-end watcher race.
//!
//! # Failure semantics
//!
//! Public operations report failures via `tracing` and leave the phase
//! observable through `phase()`; they do not return errors. Callers needing
//! certainty that a session started must check for `Synchronizing`.

use crate::clock::PlaybackClock;
use crate::export;
use crate::input::{Key, KeyMultiplexer, SubscriptionId};
use crate::session::{SyncPhase, SyncSession, TapOutcome, TimelineEntry};
use ksync_common::events::{EventBus, SyncEvent};
use ksync_common::time::format_srt_timestamp;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};
use uuid::Uuid;

/// How often the playback-end watcher re-checks the clock.
const PLAYBACK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared handle to the session state.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<RwLock<SyncSession>>,
}

impl SharedSession {
    fn new(session: SyncSession) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
        }
    }

    pub async fn phase(&self) -> SyncPhase {
        self.inner.read().await.phase()
    }

    pub async fn session_id(&self) -> Uuid {
        self.inner.read().await.session_id()
    }

    pub async fn timeline_entries(&self) -> Vec<TimelineEntry> {
        self.inner.read().await.timeline().entries().to_vec()
    }

    pub async fn lines(&self) -> Vec<String> {
        self.inner.read().await.lines().to_vec()
    }
}

/// Single-use synchronization engine.
///
/// One engine drives one session from `Idle` to a terminal phase; construct
/// a new engine to retry.
pub struct SyncEngine {
    session: SharedSession,
    events: EventBus,
    input: Arc<KeyMultiplexer>,
    tap_key: Key,
    clock: Arc<Mutex<Option<Arc<dyn PlaybackClock>>>>,
    tap_subscription: Arc<Mutex<Option<SubscriptionId>>>,
    cancel_tx: watch::Sender<bool>,
    disposed: Arc<AtomicBool>,
}

impl SyncEngine {
    /// Create an engine wired to the given multiplexer and tap key.
    pub fn new(input: Arc<KeyMultiplexer>, tap_key: Key, event_capacity: usize) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            session: SharedSession::new(SyncSession::new(Vec::new())),
            events: EventBus::new(event_capacity),
            input,
            tap_key,
            clock: Arc::new(Mutex::new(None)),
            tap_subscription: Arc::new(Mutex::new(None)),
            cancel_tx,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Notification channel for UI collaborators.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Shared session handle for observers.
    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }

    /// Current session phase.
    pub async fn phase(&self) -> SyncPhase {
        self.session.phase().await
    }

    /// Start synchronizing `lines` against `clock`.
    ///
    /// Validation failures (empty lines, engine already used or disposed)
    /// are logged and leave the phase untouched. On success the phase is
    /// `Synchronizing`, playback has begun, the tap key is subscribed, and
    /// the session task is running.
    pub async fn start(&self, lines: Vec<String>, clock: Arc<dyn PlaybackClock>) {
        if self.disposed.load(Ordering::SeqCst) {
            error!("Cannot start synchronizing: engine already disposed");
            return;
        }
        if lines.is_empty() {
            error!("Cannot start synchronizing: no lyric lines provided");
            return;
        }

        let session_id = {
            let mut session = self.session.inner.write().await;
            if session.phase() != SyncPhase::Idle {
                error!(
                    "Cannot start synchronizing: session already {}",
                    session.phase()
                );
                return;
            }
            *session = SyncSession::new(lines);
            session.begin();
            session.session_id()
        };

        *lock(&self.clock) = Some(Arc::clone(&clock));

        clock.play();
        info!("Synchronization session {} started", session_id);
        self.emit(SyncEvent::SyncStarted {
            session_id,
            timestamp: chrono::Utc::now(),
        });

        let (tap_tx, tap_rx) = mpsc::unbounded_channel();
        let subscription = self.input.subscribe(self.tap_key, move || {
            // The session task may already be gone; a dropped tap is fine
            let _ = tap_tx.send(());
        });
        *lock(&self.tap_subscription) = Some(subscription);

        let runner = self.clone_handles();
        let cancel_rx = self.cancel_tx.subscribe();
        tokio::spawn(async move {
            runner.run(clock, tap_rx, cancel_rx).await;
        });
    }

    /// Request cooperative cancellation.
    ///
    /// Takes effect at the session task's next suspension point, not
    /// instantaneously. No-op unless the session is `Synchronizing`.
    pub async fn cancel(&self) {
        if self.session.phase().await != SyncPhase::Synchronizing {
            debug!("Cancel ignored: session not synchronizing");
            return;
        }
        let _ = self.cancel_tx.send(true);
    }

    /// Idempotent teardown.
    ///
    /// Cancels an active session, detaches the tap subscription, releases
    /// the playback resource, and suppresses further notifications. Safe to
    /// call multiple times.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            debug!("Dispose called on already-disposed engine");
            return;
        }

        if self.session.phase().await == SyncPhase::Synchronizing {
            let _ = self.cancel_tx.send(true);
        }
        self.detach_tap_subscription();
        if let Some(clock) = lock(&self.clock).take() {
            clock.stop_and_release();
        }
        info!("Synchronization engine disposed");
    }

    /// Export the recorded timeline (possibly partial) as an SRT file.
    ///
    /// An empty timeline or an I/O failure is logged; nothing is written in
    /// either case.
    pub async fn export_timeline(&self, path: &Path) {
        let (entries, lines) = {
            let session = self.session.inner.read().await;
            (
                session.timeline().entries().to_vec(),
                session.lines().to_vec(),
            )
        };

        if entries.is_empty() {
            error!("No synchronized lines to export");
            return;
        }

        if let Err(e) = export::write_srt(&entries, &lines, path) {
            error!("Failed to export subtitle file: {}", e);
        }
    }

    /// Session task: taps, playback-end polling, and cancellation, all on
    /// one logical thread.
    async fn run(
        self,
        clock: Arc<dyn PlaybackClock>,
        mut tap_rx: mpsc::UnboundedReceiver<()>,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        let mut poll = interval(PLAYBACK_POLL_INTERVAL);
        let mut taps_open = true;

        loop {
            tokio::select! {
                biased;

                changed = cancel_rx.changed() => {
                    if changed.is_err() || *cancel_rx.borrow() {
                        self.enter_stopped().await;
                        break;
                    }
                }

                tap = tap_rx.recv(), if taps_open => {
                    match tap {
                        Some(()) => {
                            if self.handle_tap(clock.as_ref()).await {
                                break;
                            }
                        }
                        None => taps_open = false,
                    }
                }

                _ = poll.tick() => {
                    if !clock.is_playing() && self.try_finish("playback ended").await {
                        break;
                    }
                }
            }
        }

        debug!("Session task exited");
    }

    /// Consume one tap. Returns true when the tap registered the final line.
    async fn handle_tap(&self, clock: &dyn PlaybackClock) -> bool {
        let position = clock.position_secs();

        let (outcome, session_id) = {
            let mut session = self.session.inner.write().await;
            (session.register_tap(position), session.session_id())
        };

        match outcome {
            TapOutcome::Ignored => {
                debug!("Tap ignored: session not synchronizing");
                false
            }
            TapOutcome::Registered { line_index, finished } => {
                let stamp = format_srt_timestamp(position);
                debug!("Registered line {} at {}", line_index, stamp);
                self.emit(SyncEvent::LineRegistered {
                    session_id,
                    position: stamp,
                    line_index,
                    timestamp: chrono::Utc::now(),
                });

                if finished {
                    self.detach_tap_subscription();
                    info!(
                        "Synchronization session {} finished: all lines registered",
                        session_id
                    );
                    self.emit(SyncEvent::SyncFinished {
                        session_id,
                        timestamp: chrono::Utc::now(),
                    });
                }
                finished
            }
        }
    }

    /// Playback-end completion path. Returns true only on the transition.
    async fn try_finish(&self, reason: &str) -> bool {
        let (finished, session_id) = {
            let mut session = self.session.inner.write().await;
            (session.finish(), session.session_id())
        };

        if finished {
            self.detach_tap_subscription();
            info!("Synchronization session {} finished: {}", session_id, reason);
            self.emit(SyncEvent::SyncFinished {
                session_id,
                timestamp: chrono::Utc::now(),
            });
        }
        finished
    }

    async fn enter_stopped(&self) {
        let (stopped, session_id) = {
            let mut session = self.session.inner.write().await;
            (session.stop(), session.session_id())
        };

        if stopped {
            self.detach_tap_subscription();
            info!("Synchronization session {} stopped", session_id);
            self.emit(SyncEvent::SyncStopped {
                session_id,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn detach_tap_subscription(&self) {
        if let Some(id) = lock(&self.tap_subscription).take() {
            self.input.unsubscribe(self.tap_key, id);
        }
    }

    fn emit(&self, event: SyncEvent) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.events.emit_lossy(event);
    }

    /// Clone handles for the spawned session task.
    fn clone_handles(&self) -> Self {
        Self {
            session: self.session.clone(),
            events: self.events.clone(),
            input: Arc::clone(&self.input),
            tap_key: self.tap_key,
            clock: Arc::clone(&self.clock),
            tap_subscription: Arc::clone(&self.tap_subscription),
            cancel_tx: self.cancel_tx.clone(),
            disposed: Arc::clone(&self.disposed),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeyStateSource, QueuedKeySource};
    use std::sync::atomic::AtomicBool;

    /// Clock with scripted position and playback state.
    pub(crate) struct MockClock {
        playing: AtomicBool,
        released: AtomicBool,
        position: Mutex<f64>,
    }

    impl MockClock {
        pub(crate) fn new() -> Self {
            Self {
                playing: AtomicBool::new(false),
                released: AtomicBool::new(false),
                position: Mutex::new(0.0),
            }
        }

        pub(crate) fn set_position(&self, secs: f64) {
            *lock(&self.position) = secs;
        }

        pub(crate) fn end_playback(&self) {
            self.playing.store(false, Ordering::SeqCst);
        }

        pub(crate) fn released(&self) -> bool {
            self.released.load(Ordering::SeqCst)
        }
    }

    impl PlaybackClock for MockClock {
        fn play(&self) {
            self.playing.store(true, Ordering::SeqCst);
        }

        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }

        fn position_secs(&self) -> f64 {
            *lock(&self.position)
        }

        fn stop_and_release(&self) {
            self.playing.store(false, Ordering::SeqCst);
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct Harness {
        source: Arc<QueuedKeySource>,
        mux: Arc<KeyMultiplexer>,
        clock: Arc<MockClock>,
        engine: SyncEngine,
    }

    fn harness() -> Harness {
        let source = Arc::new(QueuedKeySource::new());
        let mux = Arc::new(KeyMultiplexer::new(
            source.clone() as Arc<dyn KeyStateSource>
        ));
        let clock = Arc::new(MockClock::new());
        let engine = SyncEngine::new(Arc::clone(&mux), Key::Space, 100);
        Harness { source, mux, clock, engine }
    }

    impl Harness {
        async fn tap_at(&self, secs: f64) {
            self.clock.set_position(secs);
            self.source.push(Key::Space);
            self.mux.tick();
            // Let the session task drain the tap channel
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn text_lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_start_with_empty_lines_stays_idle() {
        let h = harness();
        let mut rx = h.engine.events().subscribe();

        h.engine.start(Vec::new(), h.clock.clone()).await;

        assert_eq!(h.engine.phase().await, SyncPhase::Idle);
        assert!(drain(&mut rx).is_empty());
        assert!(!h.clock.is_playing());
    }

    #[tokio::test]
    async fn test_start_enters_synchronizing_and_plays() {
        let h = harness();
        let mut rx = h.engine.events().subscribe();

        h.engine.start(text_lines(&["a", "b"]), h.clock.clone()).await;

        assert_eq!(h.engine.phase().await, SyncPhase::Synchronizing);
        assert!(h.clock.is_playing());
        assert_eq!(h.mux.subscription_count(Key::Space), 1);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "SyncStarted");
    }

    #[tokio::test]
    async fn test_tap_path_finishes_on_final_line() {
        let h = harness();
        let mut rx = h.engine.events().subscribe();

        h.engine
            .start(text_lines(&["a", "b", "c"]), h.clock.clone())
            .await;

        h.tap_at(1.2).await;
        h.tap_at(4.5).await;
        h.tap_at(8.0).await;

        assert_eq!(h.engine.phase().await, SyncPhase::Finished);
        // Tap subscription detached on completion
        assert_eq!(h.mux.subscription_count(Key::Space), 0);

        let events = drain(&mut rx);
        let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                "SyncStarted",
                "LineRegistered",
                "LineRegistered",
                "LineRegistered",
                "SyncFinished"
            ]
        );

        let positions: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                SyncEvent::LineRegistered { position, .. } => Some(position.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            positions,
            vec!["00:00:01,200", "00:00:04,500", "00:00:08,000"]
        );

        let entries = h.engine.session().timeline_entries().await;
        assert_eq!(entries.len(), 3);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.line_index, i);
        }
    }

    #[tokio::test]
    async fn test_watcher_path_finishes_when_playback_ends() {
        let h = harness();
        let mut rx = h.engine.events().subscribe();

        h.engine
            .start(text_lines(&["a", "b", "c"]), h.clock.clone())
            .await;
        h.tap_at(1.5).await;

        h.clock.end_playback();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(h.engine.phase().await, SyncPhase::Finished);

        let events = drain(&mut rx);
        let finished = events
            .iter()
            .filter(|e| e.event_type() == "SyncFinished")
            .count();
        assert_eq!(finished, 1);

        // Partial timeline survives
        let entries = h.engine.session().timeline_entries().await;
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_finished_emitted_exactly_once_when_triggers_race() {
        let h = harness();
        let mut rx = h.engine.events().subscribe();

        h.engine.start(text_lines(&["a"]), h.clock.clone()).await;

        // Final tap and playback end land in the same window
        h.clock.set_position(2.0);
        h.source.push(Key::Space);
        h.mux.tick();
        h.clock.end_playback();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(h.engine.phase().await, SyncPhase::Finished);
        let finished = drain(&mut rx)
            .iter()
            .filter(|e| e.event_type() == "SyncFinished")
            .count();
        assert_eq!(finished, 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_and_blocks_further_entries() {
        let h = harness();
        let mut rx = h.engine.events().subscribe();

        h.engine
            .start(text_lines(&["a", "b", "c"]), h.clock.clone())
            .await;
        h.tap_at(1.0).await;

        h.engine.cancel().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.engine.phase().await, SyncPhase::Stopped);

        // Taps after cancellation take effect are ignored
        h.tap_at(2.0).await;
        let entries = h.engine.session().timeline_entries().await;
        assert_eq!(entries.len(), 1);

        let events = drain(&mut rx);
        let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["SyncStarted", "LineRegistered", "SyncStopped"]);
    }

    #[tokio::test]
    async fn test_cancel_ignored_when_idle() {
        let h = harness();
        h.engine.cancel().await;
        assert_eq!(h.engine.phase().await, SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let h = harness();
        h.engine.start(text_lines(&["a", "b"]), h.clock.clone()).await;

        let first_id = h.engine.session().session_id().await;
        h.engine.start(text_lines(&["x"]), h.clock.clone()).await;

        // Second start rejected: same session, same phase
        assert_eq!(h.engine.session().session_id().await, first_id);
        assert_eq!(h.engine.phase().await, SyncPhase::Synchronizing);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_releases_clock() {
        let h = harness();
        h.engine
            .start(text_lines(&["a", "b"]), h.clock.clone())
            .await;

        h.engine.dispose().await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(h.clock.released());
        assert_eq!(h.mux.subscription_count(Key::Space), 0);

        // Second dispose is a no-op
        h.engine.dispose().await;
        assert!(h.clock.released());
    }

    #[tokio::test]
    async fn test_export_after_tap_path() {
        let h = harness();
        h.engine
            .start(text_lines(&["a", "b", "c"]), h.clock.clone())
            .await;

        h.tap_at(1.2).await;
        h.tap_at(4.5).await;
        h.tap_at(8.0).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.srt");
        h.engine.export_timeline(&path).await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "1\n00:00:01,200 --> 00:00:03,200\na\n\n\
             2\n00:00:04,500 --> 00:00:06,500\nb\n\n\
             3\n00:00:08,000 --> 00:00:10,000\nc\n\n"
        );
    }

    #[tokio::test]
    async fn test_export_empty_timeline_writes_nothing() {
        let h = harness();
        h.engine.start(text_lines(&["a"]), h.clock.clone()).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.srt");
        h.engine.export_timeline(&path).await;

        assert!(!path.exists());
    }
}
