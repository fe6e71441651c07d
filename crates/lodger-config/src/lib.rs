//! Shared configuration for the Lodger request kernel.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, then an
//! optional `lodger.toml` file, then `LODGER_*` environment variables, then
//! command-line flags. The kernel only consumes a handful of switches:
//! whether middleware is skipped, whether the kernel runs under a test
//! harness (which suppresses process termination after each response), and
//! whether rendered error responses expose failure details. The remaining
//! fields configure structured logging.

mod defaults;
mod logging;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, ENV_PREFIX, default_log_filter, default_log_filter_string,
    default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "LODGER",
    discovery(
        app_name = "lodger",
        env_var = "LODGER_CONFIG_PATH",
        config_file_name = "lodger.toml",
        dotfile_name = ".lodger.toml",
        config_cli_long = "config-path"
    )
)]
pub struct Config {
    /// Bypasses the global and route middleware stacks entirely.
    #[ortho_config(default = false)]
    pub skip_middleware: bool,
    /// Keeps the process alive after each response so a harness can drive
    /// the kernel repeatedly.
    #[ortho_config(default = false)]
    pub testing: bool,
    /// Includes failure messages in rendered error responses.
    #[ortho_config(default = false)]
    pub expose_errors: bool,
    /// Filter expression handed to the tracing subscriber.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip_middleware: false,
            testing: false,
            expose_errors: false,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Returns `true` when middleware must not run for any request.
    #[must_use]
    pub const fn should_skip_middleware(&self) -> bool {
        self.skip_middleware
    }

    /// Returns `true` when the kernel is driven by a test harness.
    #[must_use]
    pub const fn is_testing(&self) -> bool {
        self.testing
    }

    /// Returns `true` when error responses may carry failure details.
    #[must_use]
    pub const fn exposes_errors(&self) -> bool {
        self.expose_errors
    }

    /// Filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Configured log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Convenience constructor for harness-driven kernels.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            testing: true,
            ..Self::default()
        }
    }
}
