//! Text ledger of source files the remote service cannot resolve.
//!
//! One line per missing file, newest first, under a fixed comment header.
//! A record is removed the moment the same filename resolves again, and the
//! whole file is deleted when no records remain so "nothing missing" stays
//! self-describing.

use crate::error::{Result, SyncError};
use crate::sidecar::MISSING_FILE_NAME;
use chrono::Local;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const HEADER: &str = "\
# Files not found on Civitai
# Format: Timestamp | Status Code | Filename
# This file is automatically updated when the script runs
# A file is removed from this list when it becomes available again
";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One missing-file record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRecord {
    /// Formatted local timestamp; lexicographic order is chronological.
    pub timestamp: String,
    pub status_code: u16,
    pub filename: String,
}

impl MissingRecord {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, " | ");
        let timestamp = parts.next()?.to_string();
        let status = parts.next()?;
        let filename = parts.next()?.to_string();
        let status_code = status.strip_prefix("Status ")?.parse().ok()?;
        Some(Self {
            timestamp,
            status_code,
            filename,
        })
    }

    fn render(&self) -> String {
        format!(
            "{} | Status {} | {}",
            self.timestamp, self.status_code, self.filename
        )
    }
}

/// The missing-models registry for one output root.
#[derive(Debug)]
pub struct MissingRegistry {
    path: PathBuf,
    records: Vec<MissingRecord>,
}

impl MissingRegistry {
    /// Load the registry, or start empty when the file does not exist.
    /// Comment lines and blank lines are skipped; unparseable records are
    /// dropped with a warning.
    pub fn load(output_root: &Path) -> Result<Self> {
        let path = output_root.join(MISSING_FILE_NAME);
        let mut records = Vec::new();

        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| SyncError::io_with_path(e, &path))?;
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                match MissingRecord::parse(line) {
                    Some(record) => records.push(record),
                    None => warn!("dropping unparseable missing-file record: {}", line),
                }
            }
        }

        Ok(Self { path, records })
    }

    /// Whether a filename currently has a live record.
    pub fn contains(&self, filename: &str) -> bool {
        self.records.iter().any(|r| r.filename == filename)
    }

    /// Filenames with live records, for workset filtering.
    pub fn filenames(&self) -> HashSet<String> {
        self.records.iter().map(|r| r.filename.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replace any record for `filename`: insert a fresh one when the
    /// lookup failed with `status_code`, or just drop it when the file
    /// resolved again (`None`). Persists immediately.
    pub fn update(&mut self, filename: &str, status_code: Option<u16>) -> Result<()> {
        self.records.retain(|r| r.filename != filename);

        if let Some(status_code) = status_code {
            self.records.push(MissingRecord {
                timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
                status_code,
                filename: filename.to_string(),
            });
        }

        self.save()
    }

    fn save(&mut self) -> Result<()> {
        if self.records.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)
                    .map_err(|e| SyncError::io_with_path(e, &self.path))?;
                info!("all models available again, removed {}", MISSING_FILE_NAME);
            }
            return Ok(());
        }

        // Newest first
        self.records
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.filename.cmp(&b.filename)));

        let mut out = String::from(HEADER);
        out.push('\n');
        for record in &self.records {
            out.push_str(&record.render());
            out.push('\n');
        }

        std::fs::write(&self.path, out).map_err(|e| SyncError::io_with_path(e, &self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_then_resolve_deletes_file() {
        let root = TempDir::new().unwrap();
        let mut registry = MissingRegistry::load(root.path()).unwrap();

        registry.update("lora.safetensors", Some(404)).unwrap();
        assert!(root.path().join(MISSING_FILE_NAME).exists());
        assert!(registry.contains("lora.safetensors"));

        registry.update("lora.safetensors", None).unwrap();
        assert!(registry.is_empty());
        assert!(!root.path().join(MISSING_FILE_NAME).exists());
    }

    #[test]
    fn test_reinsert_keeps_one_record() {
        let root = TempDir::new().unwrap();
        let mut registry = MissingRegistry::load(root.path()).unwrap();

        registry.update("a.safetensors", Some(404)).unwrap();
        registry.update("a.safetensors", Some(500)).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.records[0].status_code, 500);
    }

    #[test]
    fn test_persisted_format_and_reload() {
        let root = TempDir::new().unwrap();
        let mut registry = MissingRegistry::load(root.path()).unwrap();
        registry.update("a.safetensors", Some(404)).unwrap();
        registry.update("b.safetensors", Some(503)).unwrap();

        let contents = std::fs::read_to_string(root.path().join(MISSING_FILE_NAME)).unwrap();
        assert!(contents.starts_with("# Files not found on Civitai\n"));
        assert!(contents.contains("| Status 404 | a.safetensors"));

        let reloaded = MissingRegistry::load(root.path()).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("a.safetensors"));
        assert!(reloaded.contains("b.safetensors"));
    }

    #[test]
    fn test_other_records_survive_resolution() {
        let root = TempDir::new().unwrap();
        let mut registry = MissingRegistry::load(root.path()).unwrap();
        registry.update("a.safetensors", Some(404)).unwrap();
        registry.update("b.safetensors", Some(404)).unwrap();

        registry.update("a.safetensors", None).unwrap();
        assert!(!registry.contains("a.safetensors"));
        assert!(registry.contains("b.safetensors"));
        assert!(root.path().join(MISSING_FILE_NAME).exists());
    }

    #[test]
    fn test_unparseable_lines_are_dropped() {
        let root = TempDir::new().unwrap();
        std::fs::write(
            root.path().join(MISSING_FILE_NAME),
            "# header\n\ngarbage line\n2024-01-01 10:00:00 | Status 404 | ok.safetensors\n",
        )
        .unwrap();

        let registry = MissingRegistry::load(root.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("ok.safetensors"));
    }
}
