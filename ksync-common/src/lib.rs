//! # ksync Common Library
//!
//! Shared code for the ksync workspace:
//! - Event types (`SyncEvent` enum) and the `EventBus`
//! - SRT timestamp formatting
//! - Error types
//! - Output folder resolution

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
