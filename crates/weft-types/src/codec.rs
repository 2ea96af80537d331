//! # State Codecs
//!
//! Canonical serialization for folded state. Cross-implementation caches
//! are only comparable if the byte encoding is stable, so JSON output
//! always carries object keys in sorted order and numbers in serde's
//! shortest form. The MessagePack variant serves the guest↔host bridge for
//! WASM contracts.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Encoding of the guest↔host bridge and of persisted state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Canonical JSON.
    #[default]
    Json,
    /// MessagePack.
    Msgpack,
}

/// Failure to encode or decode state.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON encode/decode failure.
    #[error("json codec: {0}")]
    Json(#[from] serde_json::Error),
    /// MessagePack encode failure.
    #[error("msgpack encode: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),
    /// MessagePack decode failure.
    #[error("msgpack decode: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),
}

/// Recursively sorts object keys so that equal values always encode to
/// equal bytes.
#[must_use]
pub fn canonicalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(&String, &JsonValue)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::with_capacity(entries.len());
            for (key, val) in entries {
                out.insert(key.clone(), canonicalize(val));
            }
            JsonValue::Object(out)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical JSON text of a value: sorted keys, no insignificant
/// whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let tree = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&canonicalize(&tree))?)
}

/// Encodes a value under the given format.
pub fn serialize<T: Serialize>(
    format: SerializationFormat,
    value: &T,
) -> Result<Vec<u8>, CodecError> {
    match format {
        SerializationFormat::Json => Ok(canonical_json(value)?.into_bytes()),
        SerializationFormat::Msgpack => Ok(rmp_serde::to_vec_named(value)?),
    }
}

/// Decodes a value under the given format.
pub fn deserialize<T: DeserializeOwned>(
    format: SerializationFormat,
    bytes: &[u8],
) -> Result<T, CodecError> {
    match format {
        SerializationFormat::Json => Ok(serde_json::from_slice(bytes)?),
        SerializationFormat::Msgpack => Ok(rmp_serde::from_slice(bytes)?),
    }
}
