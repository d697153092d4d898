// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ports layer containing trait definitions.
//!
//! The interfaces the pipeline depends on: watchers that produce change
//! batches, the channel they produce into, and store lookups.

pub mod store;
pub mod watcher;

// Re-export commonly used traits
pub use store::{Getter, MultiGet};
pub use watcher::{Backpressure, ChangeSender, SendOutcome, Watcher};
