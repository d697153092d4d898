// SPDX-License-Identifier: MIT OR Apache-2.0

//! Initial value resolution.
//!
//! Every field is seeded once at startup by walking its sources in a fixed
//! order, each applicable source overriding the previous one:
//!
//! 1. the literal seed value
//! 2. the environment variable
//! 3. the file contents
//! 4. the Consul key
//! 5. the Redis key
//! 6. the command-line flag, applied after every field has been walked
//!
//! A Consul or Redis lookup that fails or finds nothing ends that field's
//! walk; its remaining stores are not consulted.

use crate::domain::{Config, ConfigError, Field, Result, Source};
use crate::ports::Getter;
use crate::service::flags::FlagSet;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{Instrument, Span};

/// Resolves the initial value of every field.
///
/// # Examples
///
/// ```rust
/// use harvestcfg::domain::{Config, Field, Value};
/// use harvestcfg::service::Seeder;
///
/// # #[tokio::main]
/// # async fn main() -> harvestcfg::domain::Result<()> {
/// let level = Value::<String>::shared(String::new());
/// let config = Config::builder()
///     .field(
///         Field::builder("log_level", level.clone())
///             .seed("DEBUG")
///             .flag("loglevel")
///             .build(),
///     )
///     .build()?;
///
/// Seeder::new()
///     .with_args(["--loglevel=WARN"])
///     .seed(&config)
///     .await?;
/// assert_eq!(level.get(), "WARN");
/// # Ok(())
/// # }
/// ```
pub struct Seeder {
    getters: HashMap<Source, Arc<dyn Getter>>,
    args: Vec<String>,
    span: Span,
}

impl Default for Seeder {
    fn default() -> Self {
        Self::new()
    }
}

impl Seeder {
    /// Creates a seeder reading flags from the process arguments.
    pub fn new() -> Self {
        Self {
            getters: HashMap::new(),
            args: std::env::args().skip(1).collect(),
            span: tracing::info_span!("seeder"),
        }
    }

    /// Registers the getter used for fields bound to `source`.
    pub fn with_getter(mut self, source: Source, getter: Arc<dyn Getter>) -> Self {
        self.getters.insert(source, getter);
        self
    }

    /// Replaces the arguments flags are read from.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Records this seeder's logs under `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Whether a getter is registered for `source`.
    pub fn has_getter(&self, source: Source) -> bool {
        self.getters.contains_key(&source)
    }

    /// Seeds every field of `config`.
    ///
    /// Fails immediately with [`ConfigError::MissingGetter`] when a field is
    /// bound to Consul or Redis without a registered getter, or with the
    /// field's error when a value cannot be applied. Otherwise returns
    /// [`ConfigError::Unseeded`] naming every field no source provided a value
    /// for; values applied to the other fields are kept.
    pub async fn seed(&self, config: &Config) -> Result<()> {
        self.seed_fields(config).instrument(self.span.clone()).await
    }

    async fn seed_fields(&self, config: &Config) -> Result<()> {
        let fields = config.fields();
        let mut seeded = vec![false; fields.len()];
        let mut flags = FlagSet::new();
        let mut flag_bindings: Vec<(String, usize)> = Vec::new();

        'fields: for (i, field) in fields.iter().enumerate() {
            if let Some(value) = field.key(Source::Seed) {
                field.set(value, 0)?;
                tracing::debug!(field = field.name(), "seed value applied");
                seeded[i] = true;
            }

            if let Some(var) = field.key(Source::Env) {
                match std::env::var_os(var) {
                    Some(value) => {
                        field.set(&value.to_string_lossy(), 0)?;
                        tracing::debug!(field = field.name(), var, "env var value applied");
                        seeded[i] = true;
                    }
                    None => {
                        tracing::debug!(field = field.name(), var, "env var not set");
                    }
                }
            }

            if let Some(name) = field.key(Source::Flag) {
                flags.register(name);
                flag_bindings.push((name.trim_start_matches('-').to_string(), i));
            }

            if let Some(path) = field.key(Source::File) {
                match tokio::fs::read(path).await {
                    Ok(contents) => {
                        field.set(&String::from_utf8_lossy(&contents), 0)?;
                        tracing::debug!(field = field.name(), path, "file value applied");
                        seeded[i] = true;
                    }
                    Err(e) => {
                        tracing::error!(field = field.name(), path, error = %e, "failed to read file");
                    }
                }
            }

            for source in [Source::Consul, Source::Redis] {
                let Some(key) = field.key(source) else {
                    continue;
                };
                let getter = self
                    .getters
                    .get(&source)
                    .ok_or(ConfigError::MissingGetter { origin: source })?;

                match getter.get(key).await {
                    Ok((Some(value), version)) => {
                        field.set(&value, version)?;
                        tracing::debug!(field = field.name(), %source, key, version, "store value applied");
                        seeded[i] = true;
                    }
                    Ok((None, _)) => {
                        tracing::debug!(field = field.name(), %source, key, "key did not exist");
                        continue 'fields;
                    }
                    Err(e) => {
                        tracing::error!(field = field.name(), %source, key, error = %e, "failed to get key");
                        continue 'fields;
                    }
                }
            }
        }

        if !flags.is_empty() {
            let values = flags.parse(&self.args);
            for (name, i) in &flag_bindings {
                let field: &Field = &fields[*i];
                match values.get(name) {
                    Some(value) => {
                        field.set(value, 0)?;
                        tracing::debug!(field = field.name(), flag = %name, "flag value applied");
                        seeded[*i] = true;
                    }
                    None => {
                        tracing::debug!(field = field.name(), flag = %name, "flag not given");
                    }
                }
            }
        }

        let unseeded: Vec<String> = fields
            .iter()
            .zip(&seeded)
            .filter(|(_, seeded)| !**seeded)
            .map(|(field, _)| field.name().to_string())
            .collect();
        if unseeded.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Unseeded { fields: unseeded })
        }
    }
}
