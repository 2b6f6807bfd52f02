//! Safetensors header parsing.
//!
//! A container file starts with an 8-byte little-endian length `L` followed
//! by `L` bytes of JSON. The header is enough to extract vendor metadata and
//! an optional precomputed content-hash hint, so the multi-gigabyte payload
//! never has to be read for metadata extraction.

use crate::error::{Result, SyncError};
use serde_json::{Map, Value};
use std::io::Read;
use std::path::Path;

/// Key under `__metadata__` carrying a precomputed SHA256 of the payload.
pub const HASH_HINT_KEY: &str = "modelspec.hash_sha256";

/// Length of the tag ("0x") prefixed to the hash hint value.
const HINT_PREFIX_LEN: usize = 2;

/// Decoded container header.
#[derive(Debug, Clone)]
pub struct ParsedHeader {
    /// The full header document.
    pub header: Map<String, Value>,
    /// The `__metadata__` sub-map, when present.
    pub metadata: Option<Map<String, Value>>,
    /// Content-hash hint from the metadata, prefix tag stripped.
    pub hash_hint: Option<String>,
    /// Byte offset where the tensor payload starts (8 + header length).
    pub payload_offset: u64,
}

/// Parse the embedded header of a container file.
///
/// Returns `MalformedHeader` when the length prefix or the JSON document
/// cannot be decoded; callers recover by hashing the whole file from
/// offset 0 instead of aborting.
pub fn parse_header(path: &Path) -> Result<ParsedHeader> {
    if !path.exists() {
        return Err(SyncError::FileNotFound(path.to_path_buf()));
    }

    let mut file = std::fs::File::open(path).map_err(|e| SyncError::io_with_path(e, path))?;
    let file_len = file
        .metadata()
        .map_err(|e| SyncError::io_with_path(e, path))?
        .len();

    let mut len_bytes = [0u8; 8];
    file.read_exact(&mut len_bytes)
        .map_err(|_| malformed(path, "file shorter than the 8-byte length prefix"))?;
    let header_len = u64::from_le_bytes(len_bytes);

    if header_len == 0 || header_len.saturating_add(8) > file_len {
        return Err(malformed(
            path,
            &format!(
                "declared header length {} does not fit file of {} bytes",
                header_len, file_len
            ),
        ));
    }

    let mut header_bytes = vec![0u8; header_len as usize];
    file.read_exact(&mut header_bytes)
        .map_err(|_| malformed(path, "truncated header"))?;

    let value: Value = serde_json::from_slice(&header_bytes)
        .map_err(|e| malformed(path, &format!("header is not valid JSON: {}", e)))?;
    let Value::Object(header) = value else {
        return Err(malformed(path, "header is not a JSON object"));
    };

    let metadata = header
        .get("__metadata__")
        .and_then(Value::as_object)
        .cloned();
    let hash_hint = metadata
        .as_ref()
        .and_then(|m| m.get(HASH_HINT_KEY))
        .and_then(Value::as_str)
        .and_then(strip_hint_prefix);

    Ok(ParsedHeader {
        header,
        metadata,
        hash_hint,
        payload_offset: 8 + header_len,
    })
}

/// Drop the 2-character tag in front of the hex digest.
fn strip_hint_prefix(raw: &str) -> Option<String> {
    if raw.len() > HINT_PREFIX_LEN {
        Some(raw[HINT_PREFIX_LEN..].to_lowercase())
    } else {
        None
    }
}

fn malformed(path: &Path, reason: &str) -> SyncError {
    SyncError::MalformedHeader {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
