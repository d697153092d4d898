// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection settings for the harvester itself.
//!
//! These describe *how* to reach the stores, not the fields being harvested.
//! They are usually loaded from a YAML file (see the `yaml` feature):
//!
//! ```yaml
//! consul:
//!   address: "127.0.0.1:8500"
//!   datacenter: "dc1"
//!   wait_timeout_ms: 60000
//! redis:
//!   url: "redis://127.0.0.1:6379"
//!   poll_interval_ms: 500
//! monitor:
//!   channel_capacity: 4
//!   backpressure:
//!     policy: block_for
//!     timeout_ms: 250
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn enabled() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_channel_capacity() -> usize {
    1
}

/// Top-level harvester settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Consul connection, if Consul is used
    pub consul: Option<ConsulSettings>,
    /// Redis connection, if Redis is used
    pub redis: Option<RedisSettings>,
    /// Change channel tuning
    pub monitor: MonitorSettings,
}

/// How to reach Consul.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsulSettings {
    /// Agent address, `host:port` or a full URL
    pub address: String,
    /// Datacenter, empty for the agent's own
    #[serde(default)]
    pub datacenter: String,
    /// ACL token, empty for none
    #[serde(default)]
    pub token: String,
    /// Blocking query wait time in milliseconds, `0` for the server default
    #[serde(default)]
    pub wait_timeout_ms: u64,
    /// Folder every monitored key lives under
    #[serde(default)]
    pub folder_prefix: Option<String>,
    /// Use Consul while seeding
    #[serde(default = "enabled")]
    pub seed: bool,
    /// Monitor Consul keys at runtime
    #[serde(default = "enabled")]
    pub monitor: bool,
}

impl ConsulSettings {
    /// The blocking query wait time, `None` meaning the server default.
    pub fn wait(&self) -> Option<Duration> {
        (self.wait_timeout_ms > 0).then(|| Duration::from_millis(self.wait_timeout_ms))
    }
}

/// How to reach Redis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Connection URL, e.g. `redis://127.0.0.1:6379`
    pub url: String,
    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Use Redis while seeding
    #[serde(default = "enabled")]
    pub seed: bool,
    /// Poll Redis keys at runtime
    #[serde(default = "enabled")]
    pub monitor: bool,
}

impl RedisSettings {
    /// The poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Change channel tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Number of batches the channel buffers before senders wait
    pub channel_capacity: usize,
    /// What a watcher does when the channel is full
    pub backpressure: BackpressureSettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            backpressure: BackpressureSettings::Block,
        }
    }
}

/// Serialized form of the channel backpressure policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BackpressureSettings {
    /// Wait for room
    #[default]
    Block,
    /// Wait for room up to a timeout, then drop the batch
    BlockFor {
        /// The timeout in milliseconds
        timeout_ms: u64,
    },
    /// Drop the batch immediately if there is no room
    DropNewest,
}
