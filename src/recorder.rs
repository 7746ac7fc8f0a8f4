//! Record mode: capture every call made through a real transport.

use crate::error::{Error, Result};
use crate::model::{Interaction, Outcome, RequestRecord, ResponseRecord, Session, TransportError};
use crate::transport::Transport;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Wraps a real transport. Requests go through unmodified, responses and
/// transport errors come back unmodified, and each finished call is appended
/// to the session. Any other error from the wrapped transport is returned as
/// the `TransportErrorKind::Other` error a replay would produce.
///
/// Calls are appended in the order they complete, so a test that issues
/// calls concurrently gets whatever order the transport finishes them in.
pub struct Recorder {
    inner: Arc<dyn Transport>,
    session: Mutex<Session>,
}

impl Recorder {
    pub fn new(
        session_name: impl Into<String>,
        provider: impl Into<String>,
        inner: Arc<dyn Transport>,
    ) -> Self {
        let session = Session::new(session_name, provider);
        info!(
            session = %session.name,
            provider = %session.provider,
            "Recorder initialized"
        );
        Self {
            inner,
            session: Mutex::new(session),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        // A panic elsewhere cannot leave a half-pushed interaction behind.
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a record-time value with the session.
    pub fn annotate(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().annotations.insert(key.into(), value.into());
    }

    pub fn annotation(&self, key: &str) -> Option<String> {
        self.lock().annotations.get(key).cloned()
    }

    /// A copy of everything recorded so far.
    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    pub fn into_session(self) -> Session {
        self.session
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, request: RequestRecord, outcome: Outcome) {
        let mut session = self.lock();
        let index = session.interactions.len();
        debug!(
            session = %session.name,
            index,
            request = %request.debug_key(),
            outcome = %outcome.summary(),
            "Recorder: captured interaction"
        );
        session.interactions.push(Interaction { request, outcome });
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.lock();
        f.debug_struct("Recorder")
            .field("session", &session.name)
            .field("provider", &session.provider)
            .field("interactions", &session.interactions.len())
            .finish_non_exhaustive()
    }
}

/// Records a call as canceled if its future is dropped before the real
/// transport answered.
struct PendingCall<'a> {
    recorder: &'a Recorder,
    request: Option<RequestRecord>,
}

impl PendingCall<'_> {
    fn complete(mut self, outcome: Outcome) {
        if let Some(request) = self.request.take() {
            self.recorder.append(request, outcome);
        }
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            self.recorder
                .append(request, Outcome::Error(TransportError::canceled()));
        }
    }
}

#[async_trait]
impl Transport for Recorder {
    async fn send(&self, request: RequestRecord) -> Result<ResponseRecord> {
        let pending = PendingCall {
            recorder: self,
            request: Some(request.clone()),
        };
        // Replay can only hand back a TransportError, so the live call must
        // surface the same one.
        let result = self
            .inner
            .send(request)
            .await
            .map_err(|err| Error::Transport(err.into_transport_error()));
        pending.complete(Outcome::from_result(&result));
        result
    }
}
