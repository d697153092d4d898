// SPDX-License-Identifier: MIT OR Apache-2.0

//! The harvester: seed once, then keep fields current.
//!
//! [`HarvesterBuilder`] turns store connection details into getters and
//! watchers, deriving the keys to watch from the declared fields.

use crate::domain::{Config, Result, Settings, Source};
use crate::ports::{Backpressure, Getter, Watcher};
use crate::service::{Monitor, Seeder};
use std::sync::Arc;
#[cfg(any(feature = "consul", feature = "redis"))]
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// Seeds a configuration and monitors its sources.
///
/// # Examples
///
/// ```rust,no_run
/// use harvestcfg::domain::{Config, Field, Value};
/// use harvestcfg::service::Harvester;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> harvestcfg::domain::Result<()> {
/// let level = Value::<String>::shared(String::new());
/// let config = Config::builder()
///     .field(
///         Field::builder("log_level", level.clone())
///             .seed("INFO")
///             .env("LOG_LEVEL")
///             .consul("app/log-level")
///             .build(),
///     )
///     .build()?;
///
/// let harvester = Harvester::builder(config)
///     .with_consul_seed("127.0.0.1:8500", "", "", None)
///     .with_consul_monitor("127.0.0.1:8500", "", "", Some(Duration::from_secs(60)))
///     .build()
///     .await?;
///
/// let cancel = CancellationToken::new();
/// harvester.harvest(cancel.clone()).await?;
/// println!("log level is {}", level.get());
///
/// cancel.cancel();
/// harvester.stopped().await;
/// # Ok(())
/// # }
/// ```
pub struct Harvester {
    config: Config,
    seeder: Seeder,
    monitor: Option<Monitor>,
}

impl Harvester {
    /// Starts building a harvester for `config`.
    pub fn builder(config: Config) -> HarvesterBuilder {
        HarvesterBuilder::new(config)
    }

    /// The harvested configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether any source is monitored after seeding.
    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_some()
    }

    /// Seeds every field, then starts monitoring if any watcher is configured.
    pub async fn harvest(&self, cancel: CancellationToken) -> Result<()> {
        self.seeder.seed(&self.config).await?;
        match &self.monitor {
            Some(monitor) => monitor.monitor(cancel),
            None => Ok(()),
        }
    }

    /// Resolves once monitoring has fully stopped.
    pub async fn stopped(&self) {
        if let Some(monitor) = &self.monitor {
            monitor.stopped().await;
        }
    }
}

#[cfg(feature = "consul")]
#[derive(Debug, Clone)]
struct ConsulParams {
    address: String,
    datacenter: String,
    token: String,
    wait: Option<Duration>,
}

/// Builder for [`Harvester`].
pub struct HarvesterBuilder {
    config: Config,
    getters: Vec<(Source, Arc<dyn Getter>)>,
    watchers: Vec<Arc<dyn Watcher>>,
    args: Option<Vec<String>>,
    channel_capacity: usize,
    backpressure: Backpressure,
    span: Span,
    #[cfg(feature = "consul")]
    consul_seed: Option<ConsulParams>,
    #[cfg(feature = "consul")]
    consul_monitor: Option<(ConsulParams, Option<String>)>,
    #[cfg(feature = "redis")]
    redis_seed: Option<String>,
    #[cfg(feature = "redis")]
    redis_monitor: Option<(String, Duration)>,
    #[cfg(feature = "reload")]
    file_monitor: bool,
}

impl HarvesterBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            getters: Vec::new(),
            watchers: Vec::new(),
            args: None,
            channel_capacity: 1,
            backpressure: Backpressure::default(),
            span: tracing::info_span!("harvester"),
            #[cfg(feature = "consul")]
            consul_seed: None,
            #[cfg(feature = "consul")]
            consul_monitor: None,
            #[cfg(feature = "redis")]
            redis_seed: None,
            #[cfg(feature = "redis")]
            redis_monitor: None,
            #[cfg(feature = "reload")]
            file_monitor: false,
        }
    }

    /// Seeds Consul-bound fields from the agent at `address`.
    #[cfg(feature = "consul")]
    pub fn with_consul_seed(
        mut self,
        address: &str,
        datacenter: &str,
        token: &str,
        wait: Option<Duration>,
    ) -> Self {
        self.consul_seed = Some(ConsulParams {
            address: address.to_string(),
            datacenter: datacenter.to_string(),
            token: token.to_string(),
            wait,
        });
        self
    }

    /// Watches every Consul-bound field's key.
    #[cfg(feature = "consul")]
    pub fn with_consul_monitor(
        self,
        address: &str,
        datacenter: &str,
        token: &str,
        wait: Option<Duration>,
    ) -> Self {
        self.consul_monitor_with(address, datacenter, token, None, wait)
    }

    /// Watches every Consul-bound field's key under the folder `folder`.
    ///
    /// Changes are still routed by the bare key the field declares.
    #[cfg(feature = "consul")]
    pub fn with_consul_folder_monitor(
        self,
        address: &str,
        datacenter: &str,
        token: &str,
        folder: &str,
        wait: Option<Duration>,
    ) -> Self {
        self.consul_monitor_with(address, datacenter, token, Some(folder.to_string()), wait)
    }

    #[cfg(feature = "consul")]
    fn consul_monitor_with(
        mut self,
        address: &str,
        datacenter: &str,
        token: &str,
        folder: Option<String>,
        wait: Option<Duration>,
    ) -> Self {
        let params = ConsulParams {
            address: address.to_string(),
            datacenter: datacenter.to_string(),
            token: token.to_string(),
            wait,
        };
        self.consul_monitor = Some((params, folder));
        self
    }

    /// Seeds Redis-bound fields from the server at `url`.
    #[cfg(feature = "redis")]
    pub fn with_redis_seed(mut self, url: &str) -> Self {
        self.redis_seed = Some(url.to_string());
        self
    }

    /// Polls every Redis-bound field's key every `poll_interval`.
    #[cfg(feature = "redis")]
    pub fn with_redis_monitor(mut self, url: &str, poll_interval: Duration) -> Self {
        self.redis_monitor = Some((url.to_string(), poll_interval));
        self
    }

    /// Watches every file-bound field's file.
    #[cfg(feature = "reload")]
    pub fn with_file_monitor(mut self) -> Self {
        self.file_monitor = true;
        self
    }

    /// Registers a custom getter for `source`. Replaces any built-in one.
    pub fn with_getter(mut self, source: Source, getter: Arc<dyn Getter>) -> Self {
        self.getters.push((source, getter));
        self
    }

    /// Adds a custom watcher.
    pub fn with_watcher(mut self, watcher: Arc<dyn Watcher>) -> Self {
        self.watchers.push(watcher);
        self
    }

    /// Reads flags from `args` instead of the process arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the change channel capacity (default 1).
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Sets the change channel backpressure policy (default: block).
    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    /// Parents every component's span under `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Applies store connections and channel tuning from `settings`.
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.channel_capacity = settings.monitor.channel_capacity;
        self.backpressure = settings.monitor.backpressure.into();

        #[cfg(feature = "consul")]
        if let Some(consul) = &settings.consul {
            if consul.seed {
                self = self.with_consul_seed(
                    &consul.address,
                    &consul.datacenter,
                    &consul.token,
                    consul.wait(),
                );
            }
            if consul.monitor {
                self = self.consul_monitor_with(
                    &consul.address,
                    &consul.datacenter,
                    &consul.token,
                    consul.folder_prefix.clone(),
                    consul.wait(),
                );
            }
        }

        #[cfg(feature = "redis")]
        if let Some(redis) = &settings.redis {
            if redis.seed {
                self = self.with_redis_seed(&redis.url);
            }
            if redis.monitor {
                self = self.with_redis_monitor(&redis.url, redis.poll_interval());
            }
        }

        self
    }

    /// Connects to the configured stores and assembles the harvester.
    ///
    /// No monitor is created when there is nothing to watch.
    pub async fn build(self) -> Result<Harvester> {
        let span = self.span;
        let mut seeder = Seeder::new().with_span(tracing::info_span!(parent: &span, "seeder"));
        if let Some(args) = self.args {
            seeder = seeder.with_args(args);
        }
        let mut watchers: Vec<Arc<dyn Watcher>> = Vec::new();

        #[cfg(feature = "consul")]
        {
            if let Some(params) = &self.consul_seed {
                let getter = crate::adapters::ConsulGetter::new(
                    &params.address,
                    &params.datacenter,
                    &params.token,
                    params.wait,
                )?;
                seeder = seeder.with_getter(Source::Consul, Arc::new(getter));
            }

            if let Some((params, folder)) = &self.consul_monitor {
                let items: Vec<_> = self
                    .config
                    .keys_for(Source::Consul)
                    .into_iter()
                    .map(|key| match folder {
                        Some(folder) => crate::adapters::WatchItem::key_with_prefix(key, folder.as_str()),
                        None => crate::adapters::WatchItem::key(key),
                    })
                    .collect();
                if items.is_empty() {
                    tracing::debug!(parent: &span, "no consul keys to watch");
                } else {
                    let watcher = crate::adapters::ConsulWatcher::new(
                        &params.address,
                        &params.datacenter,
                        &params.token,
                        params.wait,
                        items,
                    )?
                    .with_span(tracing::info_span!(parent: &span, "consul_watcher"));
                    watchers.push(Arc::new(watcher));
                }
            }
        }

        #[cfg(feature = "redis")]
        {
            let mut seed_store = None;
            if let Some(url) = &self.redis_seed {
                let store = crate::adapters::RedisStore::connect(url).await?;
                seeder = seeder.with_getter(Source::Redis, Arc::new(store.clone()));
                seed_store = Some((url.clone(), store));
            }

            if let Some((url, poll_interval)) = &self.redis_monitor {
                let keys = self.config.keys_for(Source::Redis);
                if keys.is_empty() {
                    tracing::debug!(parent: &span, "no redis keys to watch");
                } else {
                    let store = match seed_store {
                        Some((seed_url, store)) if seed_url == *url => store,
                        _ => crate::adapters::RedisStore::connect(url).await?,
                    };
                    let watcher = crate::adapters::RedisWatcher::new(Arc::new(store), *poll_interval, keys)?
                        .with_span(tracing::info_span!(parent: &span, "redis_watcher"));
                    watchers.push(Arc::new(watcher));
                }
            }
        }

        #[cfg(feature = "reload")]
        if self.file_monitor {
            let paths = self.config.keys_for(Source::File);
            if paths.is_empty() {
                tracing::debug!(parent: &span, "no files to watch");
            } else {
                let watcher = crate::adapters::FileWatcher::new(paths)?
                    .with_span(tracing::info_span!(parent: &span, "file_watcher"));
                watchers.push(Arc::new(watcher));
            }
        }

        for (source, getter) in self.getters {
            seeder = seeder.with_getter(source, getter);
        }
        watchers.extend(self.watchers);

        let monitor = if watchers.is_empty() {
            None
        } else {
            Some(
                Monitor::new(&self.config, watchers)?
                    .with_channel_capacity(self.channel_capacity)
                    .with_backpressure(self.backpressure)
                    .with_span(tracing::info_span!(parent: &span, "monitor")),
            )
        };

        Ok(Harvester {
            config: self.config,
            seeder,
            monitor,
        })
    }
}
