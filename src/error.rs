//! Error types for the record/replay harness.

use crate::matcher::MatchDiff;
use crate::model::{TransportError, TransportErrorKind};
use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness.
///
/// Every variant except [`Error::Transport`] is a harness verdict and should
/// surface as a test failure. None of them are retried.
#[derive(Error, Debug)]
pub enum Error {
    /// Replay requested but nothing was recorded under this name.
    #[error(
        "Session not found: {name} (looked in {path}); run the test in record mode first"
    )]
    SessionNotFound { name: String, path: String },

    /// A stored session failed to decode. Never partially used.
    #[error("Corrupt session {name}: {}{reason}", index_prefix(.index))]
    CorruptSession {
        name: String,
        index: Option<usize>,
        reason: String,
    },

    /// More calls were made than were recorded.
    #[error("Unexpected call #{index} (session {session} has {recorded} interactions): {request}")]
    UnexpectedCall {
        session: String,
        index: usize,
        recorded: usize,
        request: String,
    },

    /// Fewer calls were made than were recorded.
    #[error("Unconsumed interactions in session {session}: consumed {consumed} of {total}")]
    UnconsumedInteractions {
        session: String,
        consumed: usize,
        total: usize,
    },

    /// A call diverged from the recorded call at the same position.
    #[error("Interaction mismatch in session {session} at interaction {index}: {diff}")]
    InteractionMismatch {
        session: String,
        index: usize,
        diff: Box<MatchDiff>,
    },

    /// Record mode selected without the inputs recording depends on.
    #[error("Missing record preconditions for session {session}: {message}")]
    MissingPreconditions { session: String, message: String },

    /// Outcome of the wrapped transport, live or replayed.
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] Box<std::io::Error>),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] Box<serde_json::Error>),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a corrupt-session error for the whole file.
    pub fn corrupt(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptSession {
            name: name.into(),
            index: None,
            reason: reason.into(),
        }
    }

    /// Create a corrupt-session error naming the offending interaction.
    pub fn corrupt_at(name: impl Into<String>, index: usize, reason: impl Into<String>) -> Self {
        Self::CorruptSession {
            name: name.into(),
            index: Some(index),
            reason: reason.into(),
        }
    }

    /// Create a missing-preconditions error.
    pub fn missing_preconditions(session: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MissingPreconditions {
            session: session.into(),
            message: message.into(),
        }
    }

    /// True for the call-count and call-content verdicts the replayer issues.
    pub const fn is_replay_divergence(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedCall { .. }
                | Self::UnconsumedInteractions { .. }
                | Self::InteractionMismatch { .. }
        )
    }
}

impl Error {
    /// The form a failed call takes once recorded: transport errors as-is,
    /// anything else as [`TransportErrorKind::Other`] carrying its message.
    pub fn into_transport_error(self) -> TransportError {
        match self {
            Self::Transport(err) => err,
            other => TransportError::new(TransportErrorKind::Other, other.to_string()),
        }
    }
}

fn index_prefix(index: &Option<usize>) -> String {
    index.map(|i| format!("interaction {i}: ")).unwrap_or_default()
}

impl From<TransportError> for Error {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Box::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Box::new(value))
    }
}
