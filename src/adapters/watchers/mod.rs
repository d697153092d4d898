// SPDX-License-Identifier: MIT OR Apache-2.0

//! Watcher implementations for configuration change detection.
//!
//! This module contains implementations of the `Watcher` trait: a polling
//! watcher for Redis, a blocking-query watcher for Consul and a file watcher.

#[cfg(feature = "consul")]
pub mod consul_watcher;
#[cfg(feature = "reload")]
pub mod file_watcher;
pub mod redis_watcher;

#[cfg(feature = "consul")]
pub use consul_watcher::{ConsulWatcher, WatchItem};
#[cfg(feature = "reload")]
pub use file_watcher::FileWatcher;
pub use redis_watcher::RedisWatcher;
