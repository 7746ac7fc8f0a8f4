//! cloudreplay - record/replay harness for cloud client library tests
//!
//! A test runs against the real service once in record mode. Every call the
//! client library makes through its [`Transport`] is captured into a
//! [`Session`] and saved to disk. Afterwards the same test runs in replay
//! mode (the default) with no network and no credentials: each call must
//! match the next recorded request, and gets the recorded response back.
//!
//! Provider-specific fields that legitimately change between runs (dates,
//! signatures, request ids) are tamed with a [`ScrubRuleSet`]. Everything
//! without a rule must match exactly.
//!
//! ```no_run
//! use cloudreplay::{HarnessConfig, ModeController, RequestRecord, ScrubRegistry};
//!
//! # async fn demo() -> cloudreplay::Result<()> {
//! let controller = ModeController::with_file_store(HarnessConfig::from_env()?, ScrubRegistry::new());
//! let session = controller.begin("list-items", "fake", None)?;
//! let response = session.transport().send(RequestRecord::new("GET", "/items")).await?;
//! assert_eq!(response.status, 200);
//! session.finish()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod codec;
pub mod config;
pub mod error;
pub mod matcher;
pub mod mode;
pub mod model;
pub mod recorder;
pub mod replayer;
pub mod scrub;
pub mod store;
pub mod transport;

pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use matcher::{MatchDiff, MatchResult, compare_responses, match_request};
pub use mode::{Mode, ModeController, Provisioned, RecordInputs, SessionSummary, TestSession};
pub use model::{
    Interaction, Outcome, RequestRecord, ResponseRecord, Session, TransportError,
    TransportErrorKind,
};
pub use recorder::Recorder;
pub use replayer::Replayer;
pub use scrub::{FieldPath, ScrubPolicy, ScrubRegistry, ScrubRule, ScrubRuleSet, Side};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use transport::Transport;
#[cfg(feature = "http")]
pub use transport::http::HttpTransport;
