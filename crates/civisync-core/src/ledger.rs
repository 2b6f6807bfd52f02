//! Persistent ledger of already-processed source files.
//!
//! One JSON document per output root: `{files: [...], last_update: ...}`.
//! Loaded once per run, mutated in memory, and flushed at well-defined
//! checkpoints; a crash mid-batch loses at most the in-memory additions
//! since the last save, never the on-disk document.

use crate::error::{Result, SyncError};
use crate::scan;
use crate::sidecar::{atomic, LEDGER_FILE_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    files: Vec<String>,
    last_update: Option<DateTime<Utc>>,
}

/// The processed-files set plus its on-disk location.
#[derive(Debug)]
pub struct ProcessedLedger {
    path: PathBuf,
    files: Vec<String>,
    last_update: Option<DateTime<Utc>>,
}

impl ProcessedLedger {
    /// Load the ledger from an output root, or start empty when the file
    /// does not exist yet. A document that exists but cannot be parsed is
    /// fatal for the run.
    pub fn load(output_root: &Path) -> Result<Self> {
        let path = output_root.join(LEDGER_FILE_NAME);
        let doc = match atomic::read_json::<LedgerDocument>(&path) {
            Ok(Some(doc)) => doc,
            Ok(None) => LedgerDocument::default(),
            Err(SyncError::Json { message, .. }) => {
                return Err(SyncError::LedgerCorrupt { path, message });
            }
            Err(e) => return Err(e),
        };

        debug!("loaded ledger with {} entries from {}", doc.files.len(), path.display());
        Ok(Self {
            path,
            files: doc.files,
            last_update: doc.last_update,
        })
    }

    /// Exact-string membership test against the normalized path.
    pub fn is_processed(&self, path: &Path) -> bool {
        let key = Self::normalize(path);
        self.files.iter().any(|f| f == &key)
    }

    /// Record a source file as processed. Idempotent.
    pub fn add_processed(&mut self, path: &Path) {
        let key = Self::normalize(path);
        if !self.files.iter().any(|f| f == &key) {
            self.files.push(key);
        }
    }

    /// Keep only the entries the predicate accepts (cleanup passes).
    pub fn retain(&mut self, keep: impl FnMut(&String) -> bool) {
        self.files.retain(keep);
    }

    /// Stamp `last_update` and atomically rewrite the document.
    pub fn save(&mut self) -> Result<()> {
        self.last_update = Some(Utc::now());
        let doc = LedgerDocument {
            files: self.files.clone(),
            last_update: self.last_update,
        };
        atomic::write_json(&self.path, &doc)
    }

    /// Scan `directory` recursively and return the container files that are
    /// not in the ledger. Does not mutate the ledger.
    pub fn get_new_files(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        let all = scan::find_container_files(directory)?;
        Ok(all
            .into_iter()
            .filter(|f| !self.is_processed(f))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Absolute, platform-native path string used as the ledger key. The
    /// same normalization is applied on insert and lookup so relative and
    /// absolute spellings of one path cannot diverge.
    fn normalize(path: &Path) -> String {
        std::path::absolute(path)
            .unwrap_or_else(|_| path.to_path_buf())
            .to_string_lossy()
            .into_owned()
    }
}
