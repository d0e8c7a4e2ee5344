//! Key event multiplexer
//!
//! Decouples "a key was pressed this tick" from "what should happen". The
//! host drives `tick()` once per scheduling tick; the multiplexer polls its
//! `KeyStateSource` and dispatches to the callbacks subscribed to each key.
//!
//! Callbacks are invoked outside the subscription table lock, so a callback
//! may subscribe or unsubscribe without deadlocking. A panicking callback is
//! caught and logged; it never prevents the remaining callbacks from running
//! in the same tick.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

use crate::error::Error;

/// Keys the multiplexer can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Space,
    Enter,
    Tab,
    Escape,
    Char(char),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Space => write!(f, "space"),
            Key::Enter => write!(f, "enter"),
            Key::Tab => write!(f, "tab"),
            Key::Escape => write!(f, "escape"),
            Key::Char(c) => write!(f, "{}", c),
        }
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "space" | "spacebar" => Ok(Key::Space),
            "enter" | "return" => Ok(Key::Enter),
            "tab" => Ok(Key::Tab),
            "esc" | "escape" => Ok(Key::Escape),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Key::Char(c)),
                    _ => Err(Error::Config(format!("unrecognized key name: {:?}", s))),
                }
            }
        }
    }
}

/// Source of discrete key-press observations, polled once per tick.
pub trait KeyStateSource: Send + Sync {
    /// Keys that transitioned to pressed since the previous poll.
    fn poll_pressed(&self) -> Vec<Key>;
}

/// Queue-backed key source.
///
/// Feeders (stdin reader, tests) push presses; each `poll_pressed()` drains
/// everything accumulated since the previous tick.
#[derive(Default)]
pub struct QueuedKeySource {
    pending: Mutex<Vec<Key>>,
}

impl QueuedKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key press to be observed on the next tick.
    pub fn push(&self, key: Key) {
        lock(&self.pending).push(key);
    }
}

impl KeyStateSource for QueuedKeySource {
    fn poll_pressed(&self) -> Vec<Key> {
        std::mem::take(&mut *lock(&self.pending))
    }
}

/// Identifies one registered callback instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Registration {
    id: SubscriptionId,
    callback: Callback,
}

/// Key event multiplexer.
///
/// Multiple callbacks may be registered per key; all are invoked in
/// registration order on each matching tick. Registering the same closure
/// twice registers it twice — append semantics, not set semantics.
pub struct KeyMultiplexer {
    source: Arc<dyn KeyStateSource>,
    table: Mutex<HashMap<Key, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl KeyMultiplexer {
    pub fn new(source: Arc<dyn KeyStateSource>) -> Self {
        Self {
            source,
            table: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `callback` to run whenever `key` is observed pressed.
    ///
    /// The returned id identifies this registered instance for
    /// `unsubscribe`.
    pub fn subscribe(&self, key: Key, callback: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.table).entry(key).or_default().push(Registration {
            id,
            callback: Arc::new(callback),
        });
        debug!("Subscribed {:?} to key {}", id, key);
        id
    }

    /// Remove one registered callback instance from `key`.
    ///
    /// Drops the key's table entry entirely when no callbacks remain.
    pub fn unsubscribe(&self, key: Key, id: SubscriptionId) {
        let mut table = lock(&self.table);
        if let Some(registrations) = table.get_mut(&key) {
            registrations.retain(|r| r.id != id);
            if registrations.is_empty() {
                table.remove(&key);
            }
        }
        debug!("Unsubscribed {:?} from key {}", id, key);
    }

    /// Poll the key source once and dispatch to subscribed callbacks.
    ///
    /// Callbacks for a key run in registration order. A panicking callback
    /// is logged and skipped; the rest of the tick proceeds.
    pub fn tick(&self) {
        let pressed = self.source.poll_pressed();
        if pressed.is_empty() {
            return;
        }

        let mut to_invoke: Vec<(Key, Callback)> = Vec::new();
        {
            let table = lock(&self.table);
            for key in &pressed {
                if let Some(registrations) = table.get(key) {
                    to_invoke
                        .extend(registrations.iter().map(|r| (*key, Arc::clone(&r.callback))));
                }
            }
        }

        for (key, callback) in to_invoke {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback())) {
                error!(
                    "Callback for key {} panicked: {}",
                    key,
                    panic_message(&panic)
                );
            }
        }
    }

    /// Detach every subscription at once.
    pub fn release_all(&self) {
        lock(&self.table).clear();
        debug!("All key subscriptions released");
    }

    /// Number of callbacks currently registered for `key`.
    pub fn subscription_count(&self, key: Key) -> usize {
        lock(&self.table).get(&key).map_or(0, Vec::len)
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
