//! Textual middleware references of the form `name:arg1,arg2`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors raised while parsing a middleware reference.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MiddlewareSpecError {
    /// The reference had no name before the parameter separator.
    #[error("middleware reference '{raw}' has no name")]
    MissingName {
        /// Original reference text.
        raw: String,
    },
}

/// Parsed middleware reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MiddlewareSpec {
    name: String,
    parameters: Vec<String>,
}

impl MiddlewareSpec {
    /// Parses `name` or `name:arg1,arg2`. Whitespace around the name and
    /// each argument is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`MiddlewareSpecError::MissingName`] when the name is empty.
    pub fn parse(raw: &str) -> Result<Self, MiddlewareSpecError> {
        let (head, arguments) = raw.split_once(':').unwrap_or((raw, ""));
        let name = head.trim();
        if name.is_empty() {
            return Err(MiddlewareSpecError::MissingName {
                raw: raw.to_owned(),
            });
        }
        let parameters = if arguments.trim().is_empty() {
            Vec::new()
        } else {
            arguments
                .split(',')
                .map(|argument| argument.trim().to_owned())
                .collect()
        };
        Ok(Self {
            name: name.to_owned(),
            parameters,
        })
    }

    /// Builds a spec from parts without parsing.
    #[must_use]
    pub fn new(name: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// Middleware name used for registry lookups.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Arguments following the `:` separator.
    #[must_use]
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }
}

impl FromStr for MiddlewareSpec {
    type Err = MiddlewareSpecError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl fmt::Display for MiddlewareSpec {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.name)?;
        if !self.parameters.is_empty() {
            write!(formatter, ":{}", self.parameters.join(","))?;
        }
        Ok(())
    }
}
