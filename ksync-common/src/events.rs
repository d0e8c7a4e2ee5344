//! Event types for the ksync notification channel
//!
//! Provides the shared `SyncEvent` definitions and the `EventBus` used to fan
//! session notifications out to UI collaborators.
//!
//! # Architecture
//!
//! ksync uses hybrid communication:
//! - **EventBus** (tokio::broadcast): one-to-many notification fan-out
//! - **Command channels** (tokio::mpsc): tap delivery into the session task
//! - **Shared state** (Arc<RwLock<T>>): read-heavy session access

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Notifications emitted over the lifetime of a synchronization session.
///
/// Events are broadcast via `EventBus` and can be serialized for
/// transmission to external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Session entered `Synchronizing`; playback has begun
    SyncStarted {
        /// Session that started
        session_id: Uuid,
        /// When the session started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A lyric line was registered against the playback clock
    LineRegistered {
        /// Session the line belongs to
        session_id: Uuid,
        /// Captured playback position, SRT-formatted (`HH:MM:SS,mmm`)
        position: String,
        /// Index of the registered line within the lyric sheet
        line_index: usize,
        /// When the line was registered
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session reached a terminal `Finished` phase
    ///
    /// Fires when the final lyric line is registered or when playback ends
    /// with lines remaining, whichever happens first. Emitted exactly once
    /// per session.
    SyncFinished {
        /// Session that finished
        session_id: Uuid,
        /// When the session finished
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session was cancelled before completion
    SyncStopped {
        /// Session that was stopped
        session_id: Uuid,
        /// When the session stopped
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SyncEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            SyncEvent::SyncStarted { .. } => "SyncStarted",
            SyncEvent::LineRegistered { .. } => "LineRegistered",
            SyncEvent::SyncFinished { .. } => "SyncFinished",
            SyncEvent::SyncStopped { .. } => "SyncStopped",
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            SyncEvent::SyncStarted { session_id, .. }
            | SyncEvent::LineRegistered { session_id, .. }
            | SyncEvent::SyncFinished { session_id, .. }
            | SyncEvent::SyncStopped { session_id, .. } => *session_id,
        }
    }
}

/// One-to-many event broadcaster backed by `tokio::sync::broadcast`.
///
/// Cloning an `EventBus` yields another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use ksync_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    pub fn emit(
        &self,
        event: SyncEvent,
    ) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// For notifications where it is acceptable that no collaborator is
    /// currently watching the session.
    pub fn emit_lossy(&self, event: SyncEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Event emitted with no subscribers");
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
