//! Per-model output layout and sidecar records.
//!
//! Every processed source file gets one output subdirectory named after its
//! sanitized stem, holding small JSON sidecars that each record one aspect:
//! the content hash, the embedded header metadata, the remote version record
//! and the remote model record, plus preview assets.

pub mod atomic;

use crate::civitai::types::VersionResponse;
use crate::error::{Result, SyncError};
use crate::naming::sanitize_filename;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const HASH_SUFFIX: &str = "_hash.json";
pub const METADATA_SUFFIX: &str = "_metadata.json";
pub const MODEL_SUFFIX: &str = "_civitai_model.json";
pub const VERSION_SUFFIX: &str = "_civitai_model_version.json";
pub const PREVIEW_INFIX: &str = "_preview";

/// Name of the processed-files ledger at the output root.
pub const LEDGER_FILE_NAME: &str = "processed_files.json";
/// Name of the missing-models text ledger at the output root.
pub const MISSING_FILE_NAME: &str = "missing_from_civitai.txt";
/// Name of the duplicate-removal audit report at the output root.
pub const DUPLICATE_REPORT_NAME: &str = "duplicate_models.txt";

/// Algorithm tag recorded in hash sidecars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashType {
    #[serde(rename = "SHA256")]
    Sha256,
}

/// Content-identity sidecar: `<stem>_hash.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashSidecar {
    pub hash_type: HashType,
    pub hash_value: String,
    /// Original (unsanitized) source file name.
    pub filename: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A remote record wrapped with local bookkeeping timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord<T> {
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    pub data: T,
}

/// Persisted stand-in for an artifact whose fetch failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorStub {
    pub error: String,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
}

impl ErrorStub {
    pub fn new(error: impl Into<String>, status_code: u16) -> Self {
        Self {
            error: error.into(),
            status_code,
            timestamp: Utc::now(),
        }
    }
}

/// All filesystem locations derived from one source file.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    /// The source container file.
    pub source: PathBuf,
    /// Sanitized source stem; doubles as the output directory name.
    pub stem: String,
    pub model_dir: PathBuf,
    pub hash: PathBuf,
    pub metadata: PathBuf,
    pub model: PathBuf,
    pub version: PathBuf,
}

impl ModelPaths {
    pub fn new(output_root: &Path, source: &Path) -> Result<Self> {
        let raw_stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SyncError::Config {
                message: format!("source file has no usable stem: {}", source.display()),
            })?;
        let stem = sanitize_filename(raw_stem);
        let model_dir = output_root.join(&stem);

        Ok(Self {
            source: source.to_path_buf(),
            hash: model_dir.join(format!("{stem}{HASH_SUFFIX}")),
            metadata: model_dir.join(format!("{stem}{METADATA_SUFFIX}")),
            model: model_dir.join(format!("{stem}{MODEL_SUFFIX}")),
            version: model_dir.join(format!("{stem}{VERSION_SUFFIX}")),
            stem,
            model_dir,
        })
    }

    /// Original file name of the source container.
    pub fn source_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.stem.clone())
    }

    pub fn ensure_model_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.model_dir)
            .map_err(|e| SyncError::io_with_path(e, &self.model_dir))
    }

    /// Sidecars that must exist before a page can be generated.
    pub fn required_artifacts(&self) -> [&Path; 3] {
        [&self.hash, &self.version, &self.model]
    }

    /// Path of the preview asset at `index` with the given extension
    /// (extension includes the leading dot).
    pub fn preview(&self, index: usize, ext: &str) -> PathBuf {
        self.model_dir
            .join(format!("{}{}_{}{}", self.stem, PREVIEW_INFIX, index, ext))
    }

    /// Record the content identity of the source file.
    pub fn write_hash(&self, hash_value: &str) -> Result<()> {
        let sidecar = HashSidecar {
            hash_type: HashType::Sha256,
            hash_value: hash_value.to_string(),
            filename: self.source_name(),
            timestamp: Some(Utc::now()),
        };
        atomic::write_json(&self.hash, &sidecar)
    }

    /// Load the cached content identity, if one was recorded.
    pub fn load_hash(&self) -> Result<Option<HashSidecar>> {
        atomic::read_json(&self.hash)
    }

    /// Load the cached version record.
    ///
    /// A corrupt sidecar is treated as absent (fail open toward
    /// re-fetching) rather than aborting the file.
    pub fn load_version(&self) -> Option<StoredRecord<VersionResponse>> {
        match atomic::read_json(&self.version) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "ignoring unreadable version sidecar {}: {}",
                    self.version.display(),
                    e
                );
                None
            }
        }
    }
}
