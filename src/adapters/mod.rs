// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapters layer containing the store clients and watchers.
//!
//! This module contains concrete implementations of the traits defined in the
//! ports layer: getters and bulk readers for Consul and Redis, the watchers
//! that turn each store into change batches, and the YAML settings loader.

#[cfg(feature = "consul")]
pub mod consul;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "yaml")]
pub mod yaml_file;

pub mod watchers;

// Re-export adapters based on feature flags
#[cfg(feature = "consul")]
pub use consul::{ConsulClient, ConsulGetter};
#[cfg(feature = "redis")]
pub use redis::RedisStore;
#[cfg(feature = "yaml")]
pub use yaml_file::SettingsFile;

#[cfg(feature = "consul")]
pub use watchers::{ConsulWatcher, WatchItem};
#[cfg(feature = "reload")]
pub use watchers::FileWatcher;
pub use watchers::RedisWatcher;
