//! Streaming content-identity computation.
//!
//! The SHA256 digest of a container file doubles as the remote lookup key
//! and the local deduplication key. Hashing can start at a byte offset so
//! the already-consumed header is not digested twice.

use crate::error::{Result, SyncError};
use sha2::{Digest, Sha256};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Default read buffer size (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Compute the lowercase hex SHA256 digest of a file, starting at `offset`.
pub fn sha256_hex(path: impl AsRef<Path>, offset: u64) -> Result<String> {
    sha256_hex_with_buffer(path, offset, DEFAULT_BUFFER_SIZE)
}

/// Compute the lowercase hex SHA256 digest with a caller-chosen buffer size.
pub fn sha256_hex_with_buffer(
    path: impl AsRef<Path>,
    offset: u64,
    buffer_size: usize,
) -> Result<String> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(SyncError::FileNotFound(path.to_path_buf()));
    }

    let mut file = std::fs::File::open(path).map_err(|e| SyncError::io_with_path(e, path))?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| SyncError::io_with_path(e, path))?;
    }

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; buffer_size.max(1)];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| SyncError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
