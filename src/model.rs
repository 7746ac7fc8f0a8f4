//! Recorded request/response types.
//!
//! Records are opaque bytes plus metadata. Nothing here knows about a
//! particular provider's wire protocol.

use crate::error::{Error, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// An outbound call as the client library produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    /// URL for HTTP transports, endpoint or service path otherwise.
    pub target: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default, with = "crate::codec::body")]
    pub body: Vec<u8>,
    /// Out-of-band call data, e.g. the RPC method name of a non-HTTP call.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl RequestRecord {
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            headers: Vec::new(),
            body: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// All values for `name`, case-insensitively, in entry order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        header_values(&self.headers, name)
    }

    /// Short human-readable key used in logs and error messages.
    pub fn debug_key(&self) -> String {
        let method = self.method.to_ascii_uppercase();
        let mut out = format!("{method} {}", self.target);
        if let Some(rpc) = self.metadata.get("rpc_method") {
            out.push_str(" rpc=");
            out.push_str(rpc);
        }
        if self.body.is_empty() {
            out.push_str(" body_sha256=<none>");
        } else {
            out.push_str(" body_sha256=");
            out.push_str(&short_sha256(&self.body));
            out.push_str(" body_len=");
            out.push_str(&self.body.len().to_string());
        }
        out
    }
}

/// A response as the real transport delivered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default, with = "crate::codec::body")]
    pub body: Vec<u8>,
}

impl ResponseRecord {
    pub const fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        header_values(&self.headers, name)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn header_values<'a>(
    headers: &'a [(String, String)],
    name: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .iter()
        .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Canceled,
    Protocol,
    Other,
}

impl TransportErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Canceled => "canceled",
            Self::Protocol => "protocol",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call, in a form that can be stored and handed back on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn canceled() -> Self {
        Self::new(
            TransportErrorKind::Canceled,
            "call dropped before completion",
        )
    }
}

/// What a call produced: a response, or the error the transport raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Response(ResponseRecord),
    Error(TransportError),
}

impl Outcome {
    /// Captures the result of a real call. Errors that are not transport
    /// errors are stored as [`Error::into_transport_error`] would convert them.
    pub fn from_result(result: &Result<ResponseRecord>) -> Self {
        match result {
            Ok(response) => Self::Response(response.clone()),
            Err(Error::Transport(err)) => Self::Error(err.clone()),
            Err(other) => Self::Error(TransportError::new(
                TransportErrorKind::Other,
                other.to_string(),
            )),
        }
    }

    pub fn into_result(self) -> Result<ResponseRecord> {
        match self {
            Self::Response(response) => Ok(response),
            Self::Error(err) => Err(Error::Transport(err)),
        }
    }

    pub const fn response(&self) -> Option<&ResponseRecord> {
        match self {
            Self::Response(response) => Some(response),
            Self::Error(_) => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Response(response) => {
                format!("{} ({} bytes)", response.status, response.body.len())
            }
            Self::Error(err) => format!("error {err}"),
        }
    }
}

/// One recorded request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub request: RequestRecord,
    pub outcome: Outcome,
}

/// The complete ordered recording of one test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub name: String,
    /// Selects the scrub rule set used on replay.
    pub provider: String,
    pub recorded_at: String,
    /// Record-time values the test wants back on replay.
    pub annotations: BTreeMap<String, String>,
    pub interactions: Vec<Interaction>,
}

impl Session {
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            annotations: BTreeMap::new(),
            interactions: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }
}

pub(crate) fn short_sha256(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(12);
    for b in &digest[..6] {
        let _ = write!(out, "{b:02x}");
    }
    out
}
