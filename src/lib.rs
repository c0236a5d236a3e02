//! Ambilight TV bridge library.
//!
//! Mirrors the state of a networked TV (power, screen, volume, Ambilight)
//! behind soft-TTL caches, so a home-automation host can poll freely while
//! the TV itself is only asked when needed.

pub mod cache;
pub mod config;
pub mod error;
pub mod features;
pub mod gateway;
pub mod notifier;
pub mod tv;
pub mod wake;

#[cfg(test)]
mod testing;

pub use error::{BridgeError, Result};
pub use tv::{Snapshot, Television};
