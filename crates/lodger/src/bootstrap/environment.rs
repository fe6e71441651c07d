//! Snapshot of prefixed process environment variables.

use std::collections::BTreeMap;
use std::ffi::OsString;

/// Prefixed environment variables captured during bootstrap.
///
/// Keys keep their full names, so `LODGER_TESTING` is looked up as such;
/// [`Environment::setting`] accepts the unprefixed form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    prefix: String,
    variables: BTreeMap<String, String>,
}

impl Environment {
    /// Captures every process variable starting with `prefix`.
    ///
    /// Variables whose name or value is not valid Unicode are skipped.
    #[must_use]
    pub fn capture(prefix: &str) -> Self {
        Self::from_os_pairs(prefix, std::env::vars_os())
    }

    /// Builds a snapshot from raw OS pairs, dropping any that are not
    /// valid Unicode.
    #[must_use]
    pub fn from_os_pairs<I>(prefix: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        Self::from_pairs(
            prefix,
            pairs.into_iter().filter_map(|(key, value)| {
                Some((key.into_string().ok()?, value.into_string().ok()?))
            }),
        )
    }

    /// Builds a snapshot from explicit pairs, keeping only prefixed names.
    #[must_use]
    pub fn from_pairs<I, K, V>(prefix: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let variables = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .filter(|(key, _)| key.starts_with(prefix))
            .collect();
        Self {
            prefix: prefix.to_owned(),
            variables,
        }
    }

    /// Looks up a variable by its full name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Looks up a variable by its name without the prefix, case-insensitively.
    #[must_use]
    pub fn setting(&self, name: &str) -> Option<&str> {
        self.get(&format!("{}{}", self.prefix, name.to_ascii_uppercase()))
    }

    /// Prefix used when capturing.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.prefix.as_str()
    }

    /// Number of captured variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns `true` when nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
