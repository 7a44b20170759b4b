//! Payload encoding for the distributed layer.
//!
//! Values travel as JSON bytes. Compressed payloads are gzip streams
//! behind the literal `compressed:` prefix, so a reader can tell them
//! apart without any side channel.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::error::{CacheError, Result};

/// Marker in front of every compressed payload.
pub const COMPRESSED_PREFIX: &[u8] = b"compressed:";

/// Whether a payload carries the compression marker.
pub fn is_compressed(payload: &[u8]) -> bool {
    payload.starts_with(COMPRESSED_PREFIX)
}

/// Serializes a value to JSON bytes.
pub fn to_bytes(value: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Gzips `raw` and prepends the marker.
pub fn compress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(COMPRESSED_PREFIX.to_vec(), Compression::default());
    encoder
        .write_all(raw)
        .map_err(|e| CacheError::Serialization(format!("gzip encode failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Serialization(format!("gzip encode failed: {e}")))
}

/// Decodes a payload written by [`to_bytes`] or [`compress`].
pub fn decode(payload: &[u8]) -> Result<Value> {
    match payload.strip_prefix(COMPRESSED_PREFIX) {
        Some(gz) => {
            let mut raw = Vec::new();
            GzDecoder::new(gz)
                .read_to_end(&mut raw)
                .map_err(|e| CacheError::Serialization(format!("gzip decode failed: {e}")))?;
            Ok(serde_json::from_slice(&raw)?)
        }
        None => Ok(serde_json::from_slice(payload)?),
    }
}
