//! Replay mode: answer calls from a recorded session.

use crate::error::{Error, Result};
use crate::matcher::match_request;
use crate::model::{Outcome, RequestRecord, ResponseRecord, Session};
use crate::scrub::ScrubRuleSet;
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Stands in for the real transport. Each call must match the interaction at
/// the cursor; the cursor only moves forward, one step per matched call.
///
/// A mismatch leaves the cursor where it is and is never retried.
pub struct Replayer {
    session: Session,
    rules: Arc<ScrubRuleSet>,
    cursor: Mutex<usize>,
}

impl Replayer {
    pub fn new(session: Session, rules: Arc<ScrubRuleSet>) -> Self {
        info!(
            session = %session.name,
            provider = %session.provider,
            interactions = session.len(),
            rules = rules.provider(),
            "Replayer initialized"
        );
        Self {
            session,
            rules,
            cursor: Mutex::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of interactions consumed so far.
    pub fn cursor(&self) -> usize {
        *self.lock()
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    pub const fn annotations(&self) -> &BTreeMap<String, String> {
        &self.session.annotations
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.session.annotations.get(key).map(String::as_str)
    }

    /// Teardown check: every recorded interaction must have been consumed.
    /// Returns the number consumed.
    pub fn finish(&self) -> Result<usize> {
        let consumed = self.cursor();
        let total = self.session.len();
        if consumed < total {
            let next = &self.session.interactions[consumed].request;
            warn!(
                session = %self.session.name,
                consumed,
                total,
                next = %next.debug_key(),
                "Replay: unconsumed interactions"
            );
            return Err(Error::UnconsumedInteractions {
                session: self.session.name.clone(),
                consumed,
                total,
            });
        }
        info!(session = %self.session.name, consumed, "Replay: session fully consumed");
        Ok(consumed)
    }

    /// Matches `request` against the interaction at the cursor and, on
    /// success, advances. Match and advance happen under one lock.
    pub fn next_outcome(&self, request: &RequestRecord) -> Result<Outcome> {
        let mut cursor = self.lock();
        let index = *cursor;
        let Some(interaction) = self.session.interactions.get(index) else {
            warn!(
                session = %self.session.name,
                index,
                request = %request.debug_key(),
                "Replay: call beyond end of session"
            );
            return Err(Error::UnexpectedCall {
                session: self.session.name.clone(),
                index,
                recorded: self.session.len(),
                request: request.debug_key(),
            });
        };

        let result = match_request(request, &interaction.request, &self.rules);
        if let Some(diff) = result.diff {
            warn!(
                session = %self.session.name,
                index,
                incoming = %request.debug_key(),
                recorded = %interaction.request.debug_key(),
                diff = %diff,
                "Replay: request does not match recorded interaction"
            );
            return Err(Error::InteractionMismatch {
                session: self.session.name.clone(),
                index,
                diff: Box::new(diff),
            });
        }

        *cursor += 1;
        debug!(
            session = %self.session.name,
            index,
            request = %request.debug_key(),
            outcome = %interaction.outcome.summary(),
            "Replay: matched interaction"
        );
        Ok(interaction.outcome.clone())
    }
}

impl std::fmt::Debug for Replayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replayer")
            .field("session", &self.session.name)
            .field("interactions", &self.session.len())
            .field("cursor", &self.cursor())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for Replayer {
    async fn send(&self, request: RequestRecord) -> Result<ResponseRecord> {
        self.next_outcome(&request)?.into_result()
    }
}
