//! Common test infrastructure for `cloudreplay`.
//!
//! - A scripted fake cloud service to record against
//! - Test harness with a temporary session directory
//! - Test logging with auto-dump on failure

pub mod fake;
pub mod harness;
pub mod logging;

#[allow(unused_imports)]
pub use fake::FakeCloud;
#[allow(unused_imports)]
pub use harness::TestHarness;
