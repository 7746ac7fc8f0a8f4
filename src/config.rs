//! Harness configuration.
//!
//! The mode is decided once, when a test (or the test process) sets the
//! harness up. Nothing reads the environment at call time.

use crate::error::{Error, Result};
use crate::mode::Mode;
#[cfg(test)]
use std::collections::HashMap;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

pub const REPLAY_ENV_MODE: &str = "REPLAY_MODE";
pub const REPLAY_ENV_DIR: &str = "REPLAY_SESSION_DIR";
pub const DEFAULT_SESSION_DIR: &str = "tests/fixtures/replay";

#[cfg(test)]
static TEST_ENV_OVERRIDES: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();

#[cfg(test)]
fn test_env_overrides() -> &'static Mutex<HashMap<String, String>> {
    TEST_ENV_OVERRIDES.get_or_init(|| Mutex::new(HashMap::new()))
}

fn env_var(name: &str) -> Option<String> {
    #[cfg(test)]
    {
        if let Ok(guard) = test_env_overrides().lock() {
            if let Some(value) = guard.get(name) {
                return Some(value.clone());
            }
        }
    }
    std::env::var(name).ok()
}

#[cfg(test)]
fn set_test_env_var(name: &str, value: Option<&str>) -> Option<String> {
    let mut guard = test_env_overrides().lock().expect("env override lock");
    let previous = guard.get(name).cloned();
    match value {
        Some(value) => {
            guard.insert(name.to_string(), value.to_string());
        }
        None => {
            guard.remove(name);
        }
    }
    previous
}

#[cfg(test)]
fn restore_test_env_var(name: &str, previous: Option<String>) {
    let mut guard = test_env_overrides().lock().expect("env override lock");
    match previous {
        Some(value) => {
            guard.insert(name.to_string(), value);
        }
        None => {
            guard.remove(name);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub mode: Mode,
    /// Where session files live.
    pub session_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Replay,
            session_dir: PathBuf::from(DEFAULT_SESSION_DIR),
        }
    }
}

impl HarnessConfig {
    pub fn new(mode: Mode, session_dir: impl AsRef<Path>) -> Self {
        Self {
            mode,
            session_dir: session_dir.as_ref().to_path_buf(),
        }
    }

    pub fn record(session_dir: impl AsRef<Path>) -> Self {
        Self::new(Mode::Record, session_dir)
    }

    pub fn replay(session_dir: impl AsRef<Path>) -> Self {
        Self::new(Mode::Replay, session_dir)
    }

    /// Reads `REPLAY_MODE` and `REPLAY_SESSION_DIR`. Unset means replay from
    /// [`DEFAULT_SESSION_DIR`].
    pub fn from_env() -> Result<Self> {
        let mode = match env_var(REPLAY_ENV_MODE) {
            Some(value) => Mode::parse(&value)
                .map_err(|_| Error::config(format!("Invalid {REPLAY_ENV_MODE} value: {value}")))?,
            None => Mode::Replay,
        };
        let session_dir = env_var(REPLAY_ENV_DIR)
            .filter(|dir| !dir.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_SESSION_DIR), PathBuf::from);
        Ok(Self { mode, session_dir })
    }

    #[must_use]
    pub fn with_session_dir(mut self, session_dir: impl AsRef<Path>) -> Self {
        self.session_dir = session_dir.as_ref().to_path_buf();
        self
    }
}
