//! Test harness for record/replay tests.
//!
//! The `TestHarness` provides:
//! - A temporary session directory
//! - Mode controllers for recording into and replaying from it
//! - A test logger that dumps on failure

#![allow(dead_code)]

use super::fake::FakeCloud;
use super::logging::{TestLogger, init_tracing};
use cloudreplay::{
    HarnessConfig, Mode, ModeController, Provisioned, RecordInputs, ScrubRegistry, Session,
    TestSession, Transport,
};
use cloudreplay::store::{FileSessionStore, SessionStore};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestHarness {
    name: String,
    temp_dir: TempDir,
    logger: TestLogger,
    registry: ScrubRegistry,
}

impl TestHarness {
    pub fn new(name: impl Into<String>) -> Self {
        init_tracing();
        let name = name.into();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let logger = TestLogger::new();

        logger.info("harness", format!("Test '{name}' started"));
        logger.info_ctx("harness", "Session directory created", |ctx| {
            ctx.push(("path".into(), temp_dir.path().display().to_string()));
        });

        Self {
            name,
            temp_dir,
            logger,
            registry: ScrubRegistry::new(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: ScrubRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub const fn log(&self) -> &TestLogger {
        &self.logger
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store(&self) -> FileSessionStore {
        FileSessionStore::new(self.session_dir())
    }

    pub fn session_path(&self, session: &str) -> PathBuf {
        self.store().path_for(session)
    }

    pub fn controller(&self, mode: Mode) -> ModeController {
        ModeController::with_file_store(
            HarnessConfig::new(mode, self.session_dir()),
            self.registry.clone(),
        )
    }

    /// Starts a record-mode session against `cloud`.
    pub fn record(&self, session: &str, provider: &str, cloud: &Arc<FakeCloud>) -> TestSession {
        self.logger.info_ctx("record", "Recording session", |ctx| {
            ctx.push(("session".into(), session.to_string()));
            ctx.push(("provider".into(), provider.to_string()));
        });
        let inputs = RecordInputs::new(Arc::clone(cloud) as Arc<dyn Transport>, Provisioned::new());
        self.controller(Mode::Record)
            .begin(session, provider, Some(inputs))
            .expect("begin record session")
    }

    pub fn replay(&self, session: &str, provider: &str) -> TestSession {
        self.logger.info_ctx("replay", "Replaying session", |ctx| {
            ctx.push(("session".into(), session.to_string()));
        });
        self.controller(Mode::Replay)
            .begin(session, provider, None)
            .expect("begin replay session")
    }

    pub fn load(&self, session: &str) -> Session {
        self.store().load(session).expect("load session")
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.logger.info_ctx("harness", "Test completing", |ctx| {
            ctx.push((
                "elapsed".into(),
                format!("{:.3}s", self.logger.elapsed().as_secs_f64()),
            ));
        });

        if std::thread::panicking() {
            eprintln!("\n=== TEST FAILED: {} ===", self.name);
            eprint!("{}", self.logger.dump());
            eprintln!("=== END LOGS ===\n");

            if let Ok(path) = env::var("TEST_LOG_PATH") {
                if let Err(err) = self.logger.write_dump_to_path(&path) {
                    eprintln!("Failed to write test log to {path}: {err}");
                }
            }
        }
    }
}
