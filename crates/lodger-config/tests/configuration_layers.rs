//! Layering tests for kernel configuration.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::rstest;
use tempfile::TempDir;

use lodger_config::{Config, LogFormat};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        let previous = std::env::var_os(key);
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

fn program_args(extra: &[&str]) -> Vec<OsString> {
    std::iter::once("lodger")
        .chain(extra.iter().copied())
        .map(OsString::from)
        .collect()
}

#[test]
fn environment_enables_middleware_skip() {
    let _env = EnvOverride::set_var("LODGER_SKIP_MIDDLEWARE", OsStr::new("true"));
    let config = Config::load_from_iter(program_args(&[])).expect("load configuration");
    assert!(config.should_skip_middleware());
    assert!(!config.is_testing());
}

#[rstest]
#[case::compact("compact", LogFormat::Compact)]
#[case::json("json", LogFormat::Json)]
fn environment_selects_log_format(#[case] raw: &str, #[case] expected: LogFormat) {
    let _env = EnvOverride::set_var("LODGER_LOG_FORMAT", OsStr::new(raw));
    let config = Config::load_from_iter(program_args(&[])).expect("load configuration");
    assert_eq!(config.log_format(), expected);
}

#[test]
fn configuration_file_switches_testing_mode() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = temp_dir.path().join("lodger.toml");
    fs::write(&path, "testing = true\nlog_filter = \"lodger=debug\"\n")
        .expect("write configuration");

    let path_arg = path.to_str().expect("utf-8 path");
    let config = Config::load_from_iter(program_args(&["--config-path", path_arg]))
        .expect("load configuration");

    assert!(config.is_testing());
    assert_eq!(config.log_filter(), "lodger=debug");
}

#[test]
fn malformed_file_fails_loading() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = temp_dir.path().join("lodger.toml");
    fs::write(&path, "testing = definitely\n").expect("write configuration");

    let path_arg = path.to_str().expect("utf-8 path");
    let result = Config::load_from_iter(program_args(&["--config-path", path_arg]));

    assert!(result.is_err(), "malformed configuration must not load");
}
