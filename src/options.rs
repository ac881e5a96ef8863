//! Read-only typed access to driver configuration supplied by the caller.
//!
//! Drivers never see where their options came from. Front ends built on clap
//! can pass their [`clap::ArgMatches`] straight through; the CLI and tests
//! use [`OptionMap`]. Every accessor returns the type's zero value when a key
//! is absent or holds a value of a different type, so an absent key reads the
//! same as an explicit zero.

use std::collections::BTreeMap;

use clap::ArgMatches;

/// Typed key/value accessor used to populate driver configuration.
pub trait DriverOptions {
    /// Returns the string stored under `key`, or an empty string.
    fn string(&self, key: &str) -> String;

    /// Returns the integer stored under `key`, or `0`.
    fn int(&self, key: &str) -> i64;

    /// Returns the boolean stored under `key`, or `false`.
    fn bool(&self, key: &str) -> bool;

    /// Returns the string list stored under `key`, or an empty list.
    fn string_slice(&self, key: &str) -> Vec<String>;
}

/// A single typed option value held by [`OptionMap`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OptionValue {
    /// Free-form string value.
    String(String),
    /// Signed integer value.
    Int(i64),
    /// Boolean switch.
    Bool(bool),
    /// Repeated string value.
    StringList(Vec<String>),
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringList(value)
    }
}

/// In-memory [`DriverOptions`] implementation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OptionMap {
    values: BTreeMap<String, OptionValue>,
}

impl OptionMap {
    /// Creates an empty option map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces `key` and returns the map for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds or replaces `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.values.insert(key.into(), value.into());
    }
}

impl DriverOptions for OptionMap {
    fn string(&self, key: &str) -> String {
        match self.values.get(key) {
            Some(OptionValue::String(value)) => value.clone(),
            _ => String::new(),
        }
    }

    fn int(&self, key: &str) -> i64 {
        match self.values.get(key) {
            Some(OptionValue::Int(value)) => *value,
            _ => 0,
        }
    }

    fn bool(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(OptionValue::Bool(true)))
    }

    fn string_slice(&self, key: &str) -> Vec<String> {
        match self.values.get(key) {
            Some(OptionValue::StringList(values)) => values.clone(),
            _ => Vec::new(),
        }
    }
}

// Lookups use the `try_` accessors so unknown ids and type mismatches fall
// back to the zero value instead of panicking.
impl DriverOptions for ArgMatches {
    fn string(&self, key: &str) -> String {
        self.try_get_one::<String>(key)
            .ok()
            .flatten()
            .cloned()
            .unwrap_or_default()
    }

    fn int(&self, key: &str) -> i64 {
        self.try_get_one::<i64>(key)
            .ok()
            .flatten()
            .copied()
            .unwrap_or_default()
    }

    fn bool(&self, key: &str) -> bool {
        self.try_get_one::<bool>(key)
            .ok()
            .flatten()
            .copied()
            .unwrap_or_default()
    }

    fn string_slice(&self, key: &str) -> Vec<String> {
        self.try_get_many::<String>(key)
            .ok()
            .flatten()
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{Arg, ArgAction, Command};
    use rstest::rstest;

    fn matches_for(args: &[&str]) -> ArgMatches {
        Command::new("test")
            .arg(Arg::new("url").long("url"))
            .arg(
                Arg::new("max-attempts")
                    .long("max-attempts")
                    .value_parser(clap::value_parser!(i64)),
            )
            .arg(
                Arg::new("swarm-master")
                    .long("swarm-master")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("label")
                    .long("label")
                    .action(ArgAction::Append),
            )
            .try_get_matches_from(args)
            .unwrap_or_else(|err| panic!("parse args: {err}"))
    }

    #[test]
    fn option_map_returns_zero_values_for_absent_keys() {
        let options = OptionMap::new();
        assert_eq!(options.string("missing"), "");
        assert_eq!(options.int("missing"), 0);
        assert!(!options.bool("missing"));
        assert!(options.string_slice("missing").is_empty());
    }

    #[test]
    fn option_map_ignores_mismatched_types() {
        let options = OptionMap::new().with("max-attempts", "ten");
        assert_eq!(options.int("max-attempts"), 0);
        assert_eq!(options.string("max-attempts"), "ten");
    }

    #[rstest]
    #[case::string("url", OptionValue::from("tcp://10.0.0.5:2376"))]
    #[case::int("max-attempts", OptionValue::from(10_i64))]
    #[case::flag("swarm-master", OptionValue::from(true))]
    fn option_map_stores_typed_values(#[case] key: &str, #[case] value: OptionValue) {
        let options = OptionMap::new().with(key, value.clone());
        match value {
            OptionValue::String(expected) => assert_eq!(options.string(key), expected),
            OptionValue::Int(expected) => assert_eq!(options.int(key), expected),
            OptionValue::Bool(expected) => assert_eq!(options.bool(key), expected),
            OptionValue::StringList(expected) => assert_eq!(options.string_slice(key), expected),
        }
    }

    #[test]
    fn arg_matches_expose_typed_values() {
        let matches = matches_for(&[
            "test",
            "--url",
            "tcp://10.0.0.5:2376",
            "--max-attempts",
            "10",
            "--swarm-master",
            "--label",
            "a",
            "--label",
            "b",
        ]);

        assert_eq!(matches.string("url"), "tcp://10.0.0.5:2376");
        assert_eq!(matches.int("max-attempts"), 10);
        assert!(matches.bool("swarm-master"));
        assert_eq!(matches.string_slice("label"), vec!["a", "b"]);
    }

    #[test]
    fn arg_matches_default_when_absent_or_unknown() {
        let matches = matches_for(&["test"]);

        assert_eq!(matches.string("url"), "");
        assert_eq!(matches.int("max-attempts"), 0);
        assert!(!matches.bool("swarm-master"));
        assert!(matches.string_slice("label").is_empty());
        assert_eq!(matches.string("not-an-argument"), "");
    }
}
