//! Interaction codec.
//!
//! Interactions are stored as pretty-printed JSON with a fixed field order so
//! session files stay line-oriented and diffable. Bodies that are valid UTF-8
//! are written as text, everything else as base64; both decode back to the
//! exact original bytes. Nothing is scrubbed at this layer.

use crate::error::{Error, Result};
use crate::model::Interaction;
use serde_json::Value;
use std::io::Write;

/// Encodes one interaction.
pub fn encode(interaction: &Interaction) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_to_writer(&mut out, interaction)?;
    Ok(out)
}

pub fn encode_to_writer<W: Write>(writer: W, interaction: &Interaction) -> Result<()> {
    serde_json::to_writer_pretty(writer, interaction)?;
    Ok(())
}

/// Decodes the interaction stored at `index` of session `session`.
pub fn decode(session: &str, index: usize, bytes: &[u8]) -> Result<Interaction> {
    serde_json::from_slice(bytes).map_err(|e| Error::corrupt_at(session, index, e.to_string()))
}

/// Decodes the interaction at `index` of session `session`. The error names
/// both so a broken recording can be found quickly.
pub fn decode_value(session: &str, index: usize, value: Value) -> Result<Interaction> {
    serde_json::from_value(value).map_err(|e| Error::corrupt_at(session, index, e.to_string()))
}

/// Serde adapter for body bytes.
pub(crate) mod body {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    #[serde(rename_all = "snake_case")]
    enum BodyRef<'a> {
        Utf8(&'a str),
        Base64(String),
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "snake_case", deny_unknown_fields)]
    enum BodyOwned {
        Utf8(String),
        Base64(String),
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(bytes) {
            Ok(text) => BodyRef::Utf8(text).serialize(serializer),
            Err(_) => BodyRef::Base64(STANDARD.encode(bytes)).serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match BodyOwned::deserialize(deserializer)? {
            BodyOwned::Utf8(text) => Ok(text.into_bytes()),
            BodyOwned::Base64(data) => STANDARD
                .decode(data.as_bytes())
                .map_err(|e| D::Error::custom(format!("invalid base64 body: {e}"))),
        }
    }
}
