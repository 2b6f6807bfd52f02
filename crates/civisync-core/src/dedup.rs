//! Duplicate detection and output-directory cleanup.
//!
//! Runs as an explicit maintenance pass, not per file: groups processed
//! models by content identity, keeps the most recently processed copy of
//! each group, and reconciles the output root against the source directory.

use crate::error::{Result, SyncError};
use crate::ledger::ProcessedLedger;
use crate::naming::sanitize_filename;
use crate::scan;
use crate::sidecar::{atomic, HashSidecar, DUPLICATE_REPORT_NAME, HASH_SUFFIX};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const REPORT_HEADER: &str = "\
# Duplicate models found in input directory
# Format: Hash | Kept Model | Removed Duplicates
# This file is automatically updated when running --clean
";

/// One processed model participating in a duplicate group.
#[derive(Debug, Clone)]
pub struct DuplicateMember {
    pub model_dir: PathBuf,
    pub safetensors_file: PathBuf,
    pub processed_time: Option<DateTime<Utc>>,
}

/// Duplicate groups keyed by content identity. BTreeMap keeps the audit
/// report deterministic.
pub type DuplicateGroups = BTreeMap<String, Vec<DuplicateMember>>;

/// Resolution of one group: the authoritative copy and the removals.
#[derive(Debug)]
pub struct GroupResolution {
    pub digest: String,
    pub kept: DuplicateMember,
    pub removable: Vec<DuplicateMember>,
}

/// Counters for one cleanup pass.
#[derive(Debug, Default, Clone)]
pub struct CleanSummary {
    pub duplicate_groups: usize,
    pub removed_duplicates: usize,
    pub removed_dirs: usize,
    pub failures: usize,
}

/// Group processed models by recorded content identity.
///
/// Only output directories whose hash sidecar is readable and whose source
/// file (matched by sanitized stem) still exists participate; groups of
/// one are dropped.
pub fn find_duplicates(source_dir: &Path, output_root: &Path) -> Result<DuplicateGroups> {
    let sources = scan::find_container_files(source_dir)?;
    let mut by_stem: HashMap<String, PathBuf> = HashMap::new();
    for file in &sources {
        if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
            by_stem
                .entry(sanitize_filename(stem))
                .or_insert_with(|| file.clone());
        }
    }

    let mut groups: DuplicateGroups = BTreeMap::new();
    let entries = std::fs::read_dir(output_root)
        .map_err(|e| SyncError::io_with_path(e, output_root))?;

    for entry in entries.filter_map(|e| e.ok()) {
        let model_dir = entry.path();
        if !model_dir.is_dir() {
            continue;
        }
        let Some(dir_name) = model_dir.file_name().and_then(|n| n.to_str()).map(String::from)
        else {
            continue;
        };

        let hash_path = model_dir.join(format!("{dir_name}{HASH_SUFFIX}"));
        let sidecar: HashSidecar = match atomic::read_json(&hash_path) {
            Ok(Some(sidecar)) => sidecar,
            Ok(None) => continue,
            Err(e) => {
                warn!("skipping unreadable hash sidecar {}: {}", hash_path.display(), e);
                continue;
            }
        };
        if sidecar.hash_value.is_empty() {
            continue;
        }

        let Some(safetensors_file) = by_stem.get(&dir_name) else {
            continue;
        };

        groups.entry(sidecar.hash_value).or_default().push(DuplicateMember {
            model_dir,
            safetensors_file: safetensors_file.clone(),
            processed_time: sidecar.timestamp,
        });
    }

    groups.retain(|_, members| members.len() > 1);
    Ok(groups)
}

/// Decide which member of each group is authoritative.
///
/// Members are ordered by `processed_time` descending with missing
/// timestamps last; the newest is kept, the rest become removal candidates.
pub fn resolve(groups: &DuplicateGroups) -> Vec<GroupResolution> {
    let mut resolutions = Vec::with_capacity(groups.len());

    for (digest, members) in groups {
        let mut sorted = members.clone();
        sorted.sort_by(|a, b| b.processed_time.cmp(&a.processed_time));
        let kept = sorted.remove(0);
        resolutions.push(GroupResolution {
            digest: digest.clone(),
            kept,
            removable: sorted,
        });
    }

    resolutions
}

/// Full cleanup pass: remove duplicate output directories (with an audit
/// report), then remove output directories and ledger entries for source
/// files that no longer exist. Best-effort per entry, never transactional.
pub fn execute_clean(
    source_dir: &Path,
    output_root: &Path,
    ledger: &mut ProcessedLedger,
) -> Result<CleanSummary> {
    let mut summary = CleanSummary::default();

    info!("starting cleanup pass (duplicates)");
    let groups = find_duplicates(source_dir, output_root)?;
    let resolutions = resolve(&groups);

    if resolutions.is_empty() {
        info!("no duplicates to remove");
    } else {
        summary.duplicate_groups = resolutions.len();

        let mut report = String::from(REPORT_HEADER);
        report.push('\n');
        for resolution in &resolutions {
            report.push_str(&format!("Hash: {}\n", resolution.digest));
            report.push_str(&format!(
                "Kept: {}\n",
                resolution.kept.safetensors_file.display()
            ));
            report.push_str("Removed:\n");

            for member in &resolution.removable {
                report.push_str(&format!("  - {}\n", member.safetensors_file.display()));
                info!(
                    "removing duplicate model: {}",
                    member.model_dir.file_name().unwrap_or_default().to_string_lossy()
                );
                match std::fs::remove_dir_all(&member.model_dir) {
                    Ok(()) => summary.removed_duplicates += 1,
                    Err(e) => {
                        let failure = SyncError::CleanupFailure {
                            path: member.model_dir.clone(),
                            message: e.to_string(),
                        };
                        warn!("{}", failure);
                        summary.failures += 1;
                    }
                }
            }
            report.push('\n');
        }

        let report_path = output_root.join(DUPLICATE_REPORT_NAME);
        std::fs::write(&report_path, report)
            .map_err(|e| SyncError::io_with_path(e, &report_path))?;
        info!("duplicate report saved to {}", report_path.display());
    }

    info!("starting cleanup pass (removed models)");
    let existing: HashSet<String> = scan::find_container_files(source_dir)?
        .iter()
        .filter_map(|f| f.file_stem().and_then(|s| s.to_str()))
        .map(sanitize_filename)
        .collect();

    let entries = std::fs::read_dir(output_root)
        .map_err(|e| SyncError::io_with_path(e, output_root))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if existing.contains(name) {
            continue;
        }

        info!("removing directory {} (model not found)", name);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => summary.removed_dirs += 1,
            Err(e) => {
                let failure = SyncError::CleanupFailure {
                    path: dir.clone(),
                    message: e.to_string(),
                };
                warn!("{}", failure);
                summary.failures += 1;
            }
        }
    }

    if summary.removed_dirs > 0 {
        ledger.retain(|entry| {
            Path::new(entry)
                .file_stem()
                .and_then(|s| s.to_str())
                .map(sanitize_filename)
                .is_some_and(|stem| existing.contains(&stem))
        });
        ledger.save()?;
        info!("cleaned up {} directories", summary.removed_dirs);
    } else {
        info!("no directories to clean");
    }

    Ok(summary)
}
