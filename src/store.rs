//! Session persistence.
//!
//! A session is saved and loaded as one unit. Files are pretty-printed JSON
//! so recordings can be committed and diffed; re-recording rewrites the
//! whole file, which makes for large diffs. That is expected.

use crate::codec;
use crate::error::{Error, Result};
use crate::model::{Interaction, Session};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const SESSION_FILE_VERSION: u32 = 1;
pub const SESSION_FILE_SUFFIX: &str = ".replay.json";

pub trait SessionStore: Send + Sync {
    /// Persists `session`, replacing anything stored under its name.
    fn save(&self, session: &Session) -> Result<()>;

    /// Loads the session recorded as `name`, or fails without returning any
    /// part of it.
    fn load(&self, name: &str) -> Result<Session>;

    fn exists(&self, name: &str) -> bool;

    /// Stored session names, sorted.
    fn list(&self) -> Result<Vec<String>>;
}

#[derive(Serialize)]
struct SessionFileRef<'a> {
    version: u32,
    name: &'a str,
    provider: &'a str,
    recorded_at: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    annotations: &'a BTreeMap<String, String>,
    interactions: &'a [Interaction],
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionFile {
    version: u32,
    name: String,
    provider: String,
    #[serde(default)]
    recorded_at: String,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    interactions: Vec<Value>,
}

/// Encodes a whole session, newline-terminated.
pub fn encode_session(session: &Session) -> Result<Vec<u8>> {
    let file = SessionFileRef {
        version: SESSION_FILE_VERSION,
        name: &session.name,
        provider: &session.provider,
        recorded_at: &session.recorded_at,
        annotations: &session.annotations,
        interactions: &session.interactions,
    };
    let mut out = serde_json::to_vec_pretty(&file)?;
    out.push(b'\n');
    Ok(out)
}

/// Decodes a whole session. `name` is the name it was requested under; a
/// file holding any other session name is rejected.
pub fn decode_session(name: &str, bytes: &[u8]) -> Result<Session> {
    let file: SessionFile =
        serde_json::from_slice(bytes).map_err(|e| Error::corrupt(name, e.to_string()))?;
    if file.version != SESSION_FILE_VERSION {
        return Err(Error::corrupt(
            name,
            format!(
                "unsupported session file version {} (expected {SESSION_FILE_VERSION})",
                file.version
            ),
        ));
    }
    if file.name != name {
        return Err(Error::corrupt(
            name,
            format!("file holds session {:?}", file.name),
        ));
    }
    let interactions = file
        .interactions
        .into_iter()
        .enumerate()
        .map(|(index, value)| codec::decode_value(name, index, value))
        .collect::<Result<Vec<_>>>()?;
    Ok(Session {
        name: file.name,
        provider: file.provider,
        recorded_at: file.recorded_at,
        annotations: file.annotations,
        interactions,
    })
}

/// Maps a session name to a file stem.
pub fn sanitize_session_name(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        "session".to_string()
    } else {
        out
    }
}

/// Session names become file stems unchanged, so only ASCII letters, digits,
/// `-` and `_` are accepted. Two names can never share a file.
pub fn validate_session_name(name: &str) -> Result<()> {
    if sanitize_session_name(name) == name {
        return Ok(());
    }
    Err(Error::config(format!(
        "Invalid session name {name:?}: use ASCII letters, digits, '-' and '_' (e.g. {:?})",
        sanitize_session_name(name)
    )))
}

/// One `<name>.replay.json` file per session under `dir`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!(
            "{}{SESSION_FILE_SUFFIX}",
            sanitize_session_name(name)
        ))
    }
}

impl SessionStore for FileSessionStore {
    fn save(&self, session: &Session) -> Result<()> {
        validate_session_name(&session.name)?;
        let path = self.path_for(&session.name);
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            Error::config(format!(
                "Failed to create session dir {}: {e}",
                self.dir.display()
            ))
        })?;
        let contents = encode_session(session)?;

        // Readers see either the old file or the new one, never a mix.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|err| {
            Error::config(format!(
                "Failed to persist session file to {}: {}",
                path.display(),
                err.error
            ))
        })?;

        info!(
            session = %session.name,
            path = %path.display(),
            interactions = session.len(),
            bytes = contents.len(),
            "Saved session"
        );
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Session> {
        validate_session_name(name)?;
        let path = self.path_for(name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::SessionNotFound {
                    name: name.to_string(),
                    path: path.display().to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let session = decode_session(name, &bytes)?;
        info!(
            session = %name,
            path = %path.display(),
            interactions = session.len(),
            "Loaded session"
        );
        Ok(session)
    }

    fn exists(&self, name: &str) -> bool {
        validate_session_name(name).is_ok() && self.path_for(name).is_file()
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let file_name = entry?.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = file_name.strip_suffix(SESSION_FILE_SUFFIX) {
                names.push(stem.to_string());
            }
        }
        names.sort_unstable();
        debug!(dir = %self.dir.display(), count = names.len(), "Listed sessions");
        Ok(names)
    }
}

/// Keeps encoded sessions in memory. Encoding still goes through the codec,
/// so a test using it sees the same round trip as the file store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &Session) -> Result<()> {
        let encoded = encode_session(session)?;
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.name.clone(), encoded);
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Session> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes = sessions.get(name).ok_or_else(|| Error::SessionNotFound {
            name: name.to_string(),
            path: "<memory>".to_string(),
        })?;
        decode_session(name, bytes)
    }

    fn exists(&self, name: &str) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        Ok(names)
    }
}
