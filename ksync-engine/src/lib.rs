//! # ksync Synchronization Engine (ksync-engine)
//!
//! Core lyric-to-audio synchronization: the user taps a key in time with
//! playback to build a sparse, ordered mapping from playback time to lyric
//! line, exported as an SRT subtitle file.
//!
//! **Architecture:** a single cooperative session task (tokio) fed by a key
//! event multiplexer and a playback clock capability. Audio playback itself
//! is an external collaborator behind the `PlaybackClock` trait.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod input;
pub mod lyrics;
pub mod session;

pub use engine::{SharedSession, SyncEngine};
pub use error::{Error, Result};
