// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tolerant command-line flag lookup.
//!
//! The process arguments usually belong to the host application, so each one
//! is parsed on its own: an argument naming a flag nobody registered, or one
//! that is not a flag at all, is logged and skipped instead of failing the
//! whole parse.

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, Command};
use std::collections::HashMap;

/// The set of flag names fields are bound to.
#[derive(Debug, Default)]
pub(crate) struct FlagSet {
    names: Vec<String>,
}

impl FlagSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `name`. Registering a name twice is harmless.
    pub(crate) fn register(&mut self, name: &str) {
        let name = name.trim_start_matches('-');
        if name.is_empty() || self.names.iter().any(|n| n == name) {
            return;
        }
        self.names.push(name.to_string());
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn command(&self) -> Command {
        let mut command = Command::new("harvester")
            .no_binary_name(true)
            .disable_help_flag(true)
            .disable_version_flag(true);
        for name in &self.names {
            command = command.arg(
                Arg::new(name.clone())
                    .long(name.clone())
                    .action(ArgAction::Set)
                    .num_args(1)
                    .require_equals(true)
                    .allow_hyphen_values(true),
            );
        }
        command
    }

    /// Returns the value of every registered flag present in `args`.
    ///
    /// Flags are accepted as `--name=value` or `-name=value`; when a flag is
    /// given more than once the last occurrence wins.
    pub(crate) fn parse<S: AsRef<str>>(&self, args: &[S]) -> HashMap<String, String> {
        let mut values = HashMap::new();
        if self.is_empty() {
            return values;
        }

        let command = self.command();
        for arg in args {
            let arg = arg.as_ref();
            let Some(normalized) = normalize(arg) else {
                tracing::debug!(arg, "skipping non-flag argument");
                continue;
            };

            match command.clone().try_get_matches_from([normalized]) {
                Ok(matches) => {
                    for name in &self.names {
                        if matches.value_source(name) != Some(ValueSource::CommandLine) {
                            continue;
                        }
                        if let Some(value) = matches.get_one::<String>(name) {
                            values.insert(name.clone(), value.clone());
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(arg, kind = ?e.kind(), "could not parse flag, ignoring");
                }
            }
        }
        values
    }
}

/// Rewrites `-name=value` to `--name=value`. Returns `None` for arguments that
/// are not flags.
fn normalize(arg: &str) -> Option<String> {
    if arg == "-" || arg == "--" || !arg.starts_with('-') {
        return None;
    }
    if arg.starts_with("--") {
        Some(arg.to_string())
    } else {
        Some(format!("-{}", arg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(names: &[&str]) -> FlagSet {
        let mut set = FlagSet::new();
        for name in names {
            set.register(name);
        }
        set
    }

    #[test]
    fn test_single_and_double_dash() {
        let set = flags(&["loglevel", "port"]);
        let values = set.parse(&["-loglevel=DEBUG", "--port=8080"]);
        assert_eq!(values.get("loglevel").map(String::as_str), Some("DEBUG"));
        assert_eq!(values.get("port").map(String::as_str), Some("8080"));
    }

    #[test]
    fn test_unknown_and_malformed_arguments_are_ignored() {
        let set = flags(&["loglevel"]);
        let values = set.parse(&[
            "serve",
            "--unknown=1",
            "-loglevel",
            "--",
            "-verbose",
            "--loglevel=WARN",
        ]);
        assert_eq!(values.len(), 1);
        assert_eq!(values["loglevel"], "WARN");
    }

    #[test]
    fn test_last_occurrence_wins() {
        let set = flags(&["loglevel"]);
        let values = set.parse(&["--loglevel=INFO", "-loglevel=ERROR"]);
        assert_eq!(values["loglevel"], "ERROR");
    }

    #[test]
    fn test_values_may_contain_dashes_and_equals() {
        let set = flags(&["offset", "dsn"]);
        let values = set.parse(&["--offset=-5", "--dsn=user=admin"]);
        assert_eq!(values["offset"], "-5");
        assert_eq!(values["dsn"], "user=admin");
    }

    #[test]
    fn test_absent_flag_is_not_reported() {
        let set = flags(&["loglevel"]);
        assert!(set.parse(&["--other=1"]).is_empty());
        assert!(set.parse::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_register_dedupes() {
        let set = flags(&["a", "a", "--a", ""]);
        assert_eq!(set.names, vec!["a".to_string()]);
    }
}
