//! Mode selection and per-test session lifecycle.
//!
//! A test asks the [`ModeController`] for a [`TestSession`] once, before it
//! makes any call. In record mode that wraps the real transport in a
//! [`Recorder`] and saves the session at [`TestSession::finish`]; in replay
//! mode (the default) it loads the session and serves it from a
//! [`Replayer`], checking at `finish` that every interaction was used.

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::recorder::Recorder;
use crate::replayer::Replayer;
use crate::scrub::ScrubRegistry;
use crate::store::{FileSessionStore, SessionStore, validate_session_name};
use crate::transport::Transport;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

const RESOURCE_PREFIX: &str = "resource.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Record,
    #[default]
    Replay,
}

impl Mode {
    pub const fn from_flag(record: bool) -> Self {
        if record {
            Self::Record
        } else {
            Self::Replay
        }
    }

    /// Accepts `record`/`replay` (and `playback`), or a boolean-ish record
    /// flag such as `1`, `true`, `no`.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "record" | "1" | "true" | "yes" | "on" => Ok(Self::Record),
            "replay" | "playback" | "0" | "false" | "no" | "off" | "" => Ok(Self::Replay),
            _ => Err(Error::config(format!("Invalid mode: {value}"))),
        }
    }

    pub const fn is_record(self) -> bool {
        matches!(self, Self::Record)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Replay => "replay",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof that provisioning ran, with the names of what it created.
///
/// Resource names are stored with the recording so a replay can refer to
/// the same (no longer existing) resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provisioned {
    resources: BTreeMap<String, String>,
}

impl Provisioned {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn resource(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resources.insert(key.into(), value.into());
        self
    }

    pub const fn resources(&self) -> &BTreeMap<String, String> {
        &self.resources
    }
}

/// What record mode needs and replay mode never touches.
pub struct RecordInputs {
    /// A fully configured real transport; credentials are its concern.
    pub transport: Arc<dyn Transport>,
    pub provisioned: Provisioned,
}

impl RecordInputs {
    pub fn new(transport: Arc<dyn Transport>, provisioned: Provisioned) -> Self {
        Self {
            transport,
            provisioned,
        }
    }
}

pub struct ModeController {
    config: HarnessConfig,
    store: Arc<dyn SessionStore>,
    registry: ScrubRegistry,
}

impl ModeController {
    pub fn new(config: HarnessConfig, store: Arc<dyn SessionStore>, registry: ScrubRegistry) -> Self {
        Self {
            config,
            store,
            registry,
        }
    }

    /// Uses a [`FileSessionStore`] rooted at the configured session dir.
    pub fn with_file_store(config: HarnessConfig, registry: ScrubRegistry) -> Self {
        let store = Arc::new(FileSessionStore::new(&config.session_dir));
        Self::new(config, store, registry)
    }

    pub const fn mode(&self) -> Mode {
        self.config.mode
    }

    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Sets up one test. `record` is required in record mode and ignored in
    /// replay mode. `name` must already be a valid file stem, see
    /// [`validate_session_name`].
    pub fn begin(
        &self,
        name: &str,
        provider: &str,
        record: Option<RecordInputs>,
    ) -> Result<TestSession> {
        validate_session_name(name)?;
        match self.config.mode {
            Mode::Record => {
                let Some(inputs) = record else {
                    return Err(Error::missing_preconditions(
                        name,
                        "record mode needs a real transport and completed provisioning",
                    ));
                };
                let recorder = Arc::new(Recorder::new(name, provider, inputs.transport));
                for (key, value) in inputs.provisioned.resources() {
                    recorder.annotate(format!("{RESOURCE_PREFIX}{key}"), value.clone());
                }
                info!(session = name, provider, mode = %Mode::Record, "Test session started");
                Ok(TestSession::new(
                    name,
                    Wrapper::Record(recorder),
                    Arc::clone(&self.store),
                ))
            }
            Mode::Replay => {
                let session = self.store.load(name)?;
                if session.provider != provider {
                    warn!(
                        session = name,
                        requested = provider,
                        recorded = %session.provider,
                        "Provider differs from recording; using recorded provider's rules"
                    );
                }
                let rules = self.registry.lookup(&session.provider);
                let replayer = Arc::new(Replayer::new(session, rules));
                info!(session = name, provider, mode = %Mode::Replay, "Test session started");
                Ok(TestSession::new(
                    name,
                    Wrapper::Replay(replayer),
                    Arc::clone(&self.store),
                ))
            }
        }
    }
}

impl fmt::Debug for ModeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeController")
            .field("config", &self.config)
            .field("providers", &self.registry.providers())
            .finish_non_exhaustive()
    }
}

enum Wrapper {
    Record(Arc<Recorder>),
    Replay(Arc<Replayer>),
}

/// One test's view of the harness.
pub struct TestSession {
    name: String,
    wrapper: Wrapper,
    store: Arc<dyn SessionStore>,
    finished: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub name: String,
    pub mode: Mode,
    /// Recorded (record mode) or consumed (replay mode) interactions.
    pub interactions: usize,
}

impl TestSession {
    fn new(name: &str, wrapper: Wrapper, store: Arc<dyn SessionStore>) -> Self {
        Self {
            name: name.to_string(),
            wrapper,
            store,
            finished: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn mode(&self) -> Mode {
        match self.wrapper {
            Wrapper::Record(_) => Mode::Record,
            Wrapper::Replay(_) => Mode::Replay,
        }
    }

    /// The transport to hand to the client library under test.
    pub fn transport(&self) -> Arc<dyn Transport> {
        match &self.wrapper {
            Wrapper::Record(recorder) => Arc::clone(recorder) as Arc<dyn Transport>,
            Wrapper::Replay(replayer) => Arc::clone(replayer) as Arc<dyn Transport>,
        }
    }

    /// Stores a record-time value with the session. In replay mode the
    /// recorded value stands and this is a no-op.
    pub fn annotate(&self, key: impl Into<String>, value: impl Into<String>) {
        match &self.wrapper {
            Wrapper::Record(recorder) => recorder.annotate(key, value),
            Wrapper::Replay(_) => {
                debug!(session = %self.name, key = %key.into(), "Replay: annotate ignored");
            }
        }
    }

    pub fn annotation(&self, key: &str) -> Option<String> {
        match &self.wrapper {
            Wrapper::Record(recorder) => recorder.annotation(key),
            Wrapper::Replay(replayer) => replayer.annotation(key).map(str::to_string),
        }
    }

    /// Name of a provisioned resource, in either mode.
    pub fn resource(&self, key: &str) -> Option<String> {
        self.annotation(&format!("{RESOURCE_PREFIX}{key}"))
    }

    /// A value that must be identical across record and replay, such as a
    /// randomly generated object name. Record mode calls `generate` and
    /// stores the result; replay mode returns the stored value.
    pub fn stable_value<F>(&self, key: &str, generate: F) -> Result<String>
    where
        F: FnOnce() -> String,
    {
        match &self.wrapper {
            Wrapper::Record(recorder) => {
                if let Some(existing) = recorder.annotation(key) {
                    return Ok(existing);
                }
                let value = generate();
                recorder.annotate(key, value.clone());
                Ok(value)
            }
            Wrapper::Replay(replayer) => replayer.annotation(key).map(str::to_string).ok_or_else(|| {
                Error::corrupt(
                    &self.name,
                    format!("recording has no value for {key:?}; re-record the test"),
                )
            }),
        }
    }

    /// Teardown. Record mode saves the session; replay mode fails if any
    /// recorded interaction went unused.
    pub fn finish(mut self) -> Result<SessionSummary> {
        self.finished = true;
        let interactions = match &self.wrapper {
            Wrapper::Record(recorder) => {
                let session = recorder.snapshot();
                self.store.save(&session)?;
                session.len()
            }
            Wrapper::Replay(replayer) => replayer.finish()?,
        };
        let summary = SessionSummary {
            name: self.name.clone(),
            mode: self.mode(),
            interactions,
        };
        info!(
            session = %summary.name,
            mode = %summary.mode,
            interactions = summary.interactions,
            "Test session finished"
        );
        Ok(summary)
    }
}

impl fmt::Debug for TestSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSession")
            .field("name", &self.name)
            .field("mode", &self.mode())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        if !self.finished && !std::thread::panicking() {
            warn!(
                session = %self.name,
                mode = %self.mode(),
                "Test session dropped without finish(); nothing saved or checked"
            );
        }
    }
}
