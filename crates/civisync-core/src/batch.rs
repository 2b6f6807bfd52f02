//! Batch orchestration.
//!
//! The top-level state machine: select a work set, drive each file through
//! extraction → identity → fetch → staleness check → persistence, pace
//! between files, and aggregate per-run counts. Strictly sequential by
//! design; pacing and rate-limit friendliness depend on there never being
//! more than one request in flight.

use crate::civitai::client::{CivitaiClient, FetchOutcome};
use crate::civitai::images;
use crate::config::{ImagePolicy, Mode, RunConfig, Source};
use crate::dedup::{self, CleanSummary};
use crate::error::{Result, SyncError};
use crate::hashing;
use crate::header;
use crate::ledger::ProcessedLedger;
use crate::missing::MissingRegistry;
use crate::render::PageRenderer;
use crate::scan;
use crate::sidecar::{atomic, ErrorStub, ModelPaths, StoredRecord};
use crate::staleness;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Fetched and persisted (or re-rendered).
    Processed,
    /// Remote record unchanged; nothing re-fetched.
    UpToDate,
    /// Not eligible in this mode (e.g. no cached identity in only-update).
    Skipped,
}

/// Aggregated counters for one batch run.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Files that completed without error (fresh or already current).
    pub fn succeeded(&self) -> usize {
        self.processed + self.up_to_date
    }
}

/// Result of a run: a per-file batch, or a maintenance cleanup.
#[derive(Debug)]
pub enum RunOutcome {
    Batch(RunSummary),
    Clean(CleanSummary),
}

/// Sequential batch processor.
pub struct BatchOrchestrator<R: PageRenderer> {
    config: RunConfig,
    client: CivitaiClient,
    renderer: R,
}

impl<R: PageRenderer> BatchOrchestrator<R> {
    pub fn new(config: RunConfig, renderer: R) -> Result<Self> {
        config.validate()?;
        let client = CivitaiClient::new(config.api_key.clone())?;
        Ok(Self {
            config,
            client,
            renderer,
        })
    }

    /// Construct with a caller-provided client (tests, custom endpoints).
    pub fn with_client(config: RunConfig, client: CivitaiClient, renderer: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            client,
            renderer,
        })
    }

    /// Execute the configured run.
    pub async fn run(&self) -> Result<RunOutcome> {
        let output_root = &self.config.output_root;
        if !output_root.is_dir() {
            return Err(SyncError::Config {
                message: format!(
                    "output root {} does not exist or is not a directory",
                    output_root.display()
                ),
            });
        }

        let outcome = match (&self.config.mode, &self.config.source) {
            (Mode::Clean, Source::Directory(dir)) => {
                let mut ledger = ProcessedLedger::load(output_root)?;
                let summary = dedup::execute_clean(dir, output_root, &mut ledger)?;
                RunOutcome::Clean(summary)
            }
            // validate() rejects clean + single before we get here
            (Mode::Clean, Source::Single(_)) => unreachable!("validated configuration"),
            (_, Source::Single(file)) => RunOutcome::Batch(self.run_single(file).await?),
            (_, Source::Directory(dir)) => RunOutcome::Batch(self.run_directory(dir).await?),
        };

        self.renderer.render_index(output_root)?;
        Ok(outcome)
    }

    async fn run_single(&self, file: &Path) -> Result<RunSummary> {
        let mut missing = MissingRegistry::load(&self.config.output_root)?;
        let mut summary = RunSummary {
            total: 1,
            ..RunSummary::default()
        };

        info!("processing {}", file.display());
        match self.process_file(file, &mut missing).await {
            Ok(FileOutcome::Processed) => summary.processed += 1,
            Ok(FileOutcome::UpToDate) => summary.up_to_date += 1,
            Ok(FileOutcome::Skipped) => summary.skipped += 1,
            Err(e) => {
                warn!("failed to process {}: {}", file.display(), e);
                summary.failed += 1;
            }
        }

        Ok(summary)
    }

    async fn run_directory(&self, dir: &Path) -> Result<RunSummary> {
        if !dir.is_dir() {
            return Err(SyncError::NotADirectory(dir.to_path_buf()));
        }

        let mut ledger = ProcessedLedger::load(&self.config.output_root)?;
        let mut missing = MissingRegistry::load(&self.config.output_root)?;

        let workset = self.select_workset(dir, &ledger, &missing)?;
        let mut summary = RunSummary {
            total: workset.len(),
            ..RunSummary::default()
        };
        if workset.is_empty() {
            info!("no files to process");
            return Ok(summary);
        }
        info!(
            "found {} safetensors files ({} mode)",
            workset.len(),
            self.config.mode.as_str()
        );

        for (index, file) in workset.iter().enumerate() {
            let shown = file.strip_prefix(dir).unwrap_or(file);
            info!("[{}/{}] processing {}", index + 1, workset.len(), shown.display());

            match self.process_file(file, &mut missing).await {
                Ok(outcome @ (FileOutcome::Processed | FileOutcome::UpToDate)) => {
                    match self.config.mode {
                        Mode::Full | Mode::OnlyNew => ledger.add_processed(file),
                        // Timestamp-only refresh, flushed immediately
                        Mode::OnlyUpdate => ledger.save()?,
                        Mode::OnlyHtml => {}
                        Mode::Clean => unreachable!("clean bypasses the per-file loop"),
                    }
                    if outcome == FileOutcome::UpToDate {
                        summary.up_to_date += 1;
                    } else {
                        summary.processed += 1;
                    }
                }
                Ok(FileOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    warn!("skipping {}: {}", shown.display(), e);
                    summary.failed += 1;
                }
            }

            if self.should_pace() && index + 1 < workset.len() {
                let delay = self.config.pacing.sample();
                info!(
                    "waiting {:.1}s before the next file (rate-limit pacing)",
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }
        }

        if matches!(self.config.mode, Mode::Full | Mode::OnlyNew) {
            ledger.save()?;
        }

        Ok(summary)
    }

    fn should_pace(&self) -> bool {
        self.config.pacing.enabled && matches!(self.config.mode, Mode::Full | Mode::OnlyNew)
    }

    /// Pick the files this run will visit.
    fn select_workset(
        &self,
        dir: &Path,
        ledger: &ProcessedLedger,
        missing: &MissingRegistry,
    ) -> Result<Vec<PathBuf>> {
        match self.config.mode {
            Mode::OnlyNew => {
                let mut files = ledger.get_new_files(dir)?;
                if self.config.skip_missing {
                    let known_missing = missing.filenames();
                    files.retain(|f| {
                        f.file_name()
                            .and_then(|n| n.to_str())
                            .is_none_or(|name| !known_missing.contains(name))
                    });
                }
                Ok(files)
            }
            Mode::OnlyUpdate => {
                let mut files = Vec::new();
                for file in scan::find_container_files(dir)? {
                    let paths = ModelPaths::new(&self.config.output_root, &file)?;
                    if paths.hash.exists() {
                        files.push(file);
                    }
                }
                Ok(files)
            }
            Mode::Full | Mode::OnlyHtml => scan::find_container_files(dir),
            Mode::Clean => unreachable!("clean bypasses workset selection"),
        }
    }

    /// Drive one file through the pipeline.
    async fn process_file(
        &self,
        source: &Path,
        missing: &mut MissingRegistry,
    ) -> Result<FileOutcome> {
        if !source.exists() {
            return Err(SyncError::FileNotFound(source.to_path_buf()));
        }
        if !scan::is_container_file(source) {
            return Err(SyncError::InvalidFileType {
                expected: scan::CONTAINER_EXTENSION.to_string(),
                actual: source
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("(none)")
                    .to_string(),
            });
        }

        let paths = ModelPaths::new(&self.config.output_root, source)?;
        paths.ensure_model_dir()?;

        if self.config.mode == Mode::OnlyHtml {
            let absent: Vec<PathBuf> = paths
                .required_artifacts()
                .iter()
                .filter(|p| !p.exists())
                .map(|p| p.to_path_buf())
                .collect();
            if !absent.is_empty() {
                return Err(SyncError::MissingArtifacts {
                    file: paths.source_name(),
                    missing: absent,
                });
            }
            self.renderer.render_model(&paths)?;
            return Ok(FileOutcome::Processed);
        }

        let identity = if self.config.mode == Mode::OnlyUpdate {
            match paths.load_hash()? {
                Some(sidecar) if !sidecar.hash_value.is_empty() => {
                    debug!("reusing cached identity for {}", paths.stem);
                    sidecar.hash_value
                }
                _ => {
                    info!("skipping {} (not previously processed)", paths.source_name());
                    return Ok(FileOutcome::Skipped);
                }
            }
        } else {
            self.establish_identity(&paths)?
        };

        self.sync_remote(&paths, &identity, missing).await
    }

    /// Extract the header, persist the metadata sidecar, and settle on a
    /// content identity.
    ///
    /// An embedded hash hint wins outright; otherwise the payload is
    /// digested from the post-header offset, and from offset 0 when the
    /// header cannot be parsed at all.
    fn establish_identity(&self, paths: &ModelPaths) -> Result<String> {
        let identity = match header::parse_header(&paths.source) {
            Ok(parsed) => {
                match &parsed.metadata {
                    Some(metadata) => atomic::write_json(&paths.metadata, metadata)?,
                    None => atomic::write_json(&paths.metadata, &parsed.header)?,
                }
                debug!("metadata extracted to {}", paths.metadata.display());

                match parsed.hash_hint {
                    Some(hint) => {
                        debug!("using embedded hash hint for {}", paths.source_name());
                        hint
                    }
                    None => hashing::sha256_hex_with_buffer(
                        &paths.source,
                        parsed.payload_offset,
                        self.config.hash_buffer_size,
                    )?,
                }
            }
            Err(SyncError::MalformedHeader { reason, .. }) => {
                warn!(
                    "could not parse header of {} ({}), hashing the whole file",
                    paths.source_name(),
                    reason
                );
                hashing::sha256_hex_with_buffer(&paths.source, 0, self.config.hash_buffer_size)?
            }
            Err(e) => return Err(e),
        };

        paths.write_hash(&identity)?;
        Ok(identity)
    }

    /// Fetch the remote records for an identity, decide staleness, and
    /// persist everything that changed.
    async fn sync_remote(
        &self,
        paths: &ModelPaths,
        identity: &str,
        missing: &mut MissingRegistry,
    ) -> Result<FileOutcome> {
        let file_name = paths.source_name();

        let fresh = match self.client.version_by_hash(identity).await? {
            FetchOutcome::Failed { status } => {
                atomic::write_json(
                    &paths.version,
                    &ErrorStub::new("Failed to fetch Civitai data", status),
                )?;
                missing.update(&file_name, Some(status))?;
                return Err(SyncError::Remote {
                    url: format!("model-versions/by-hash/{}", &identity[..identity.len().min(12)]),
                    status,
                });
            }
            FetchOutcome::Success(version) => version,
        };

        let cached = paths.load_version();
        if !staleness::needs_update(cached.as_ref(), Some(&fresh)) {
            info!("{} is up to date", file_name);
            return Ok(FileOutcome::UpToDate);
        }

        let now = Utc::now();
        let record = StoredRecord {
            created_at: cached.map(|c| c.created_at).unwrap_or(now),
            updated_at: now,
            data: fresh,
        };
        atomic::write_json(&paths.version, &record)?;
        info!("version data saved to {}", paths.version.display());

        // The service knows the file again; clear any missing record
        missing.update(&file_name, None)?;

        let version = &record.data;
        match self.config.images {
            ImagePolicy::None => {}
            ImagePolicy::First => {
                if let Some(image) = version.images.first() {
                    images::download_preview(&self.client, image, paths, 0).await?;
                }
            }
            ImagePolicy::All => {
                for (index, image) in version.images.iter().enumerate() {
                    images::download_preview(&self.client, image, paths, index).await?;
                }
            }
        }

        match self.client.model_by_id(version.model_id).await? {
            FetchOutcome::Success(model) => {
                atomic::write_json(&paths.model, &model)?;
                info!("model details saved to {}", paths.model.display());
            }
            FetchOutcome::Failed { status } => {
                atomic::write_json(
                    &paths.model,
                    &ErrorStub::new("Failed to fetch model details", status),
                )?;
                return Err(SyncError::Remote {
                    url: self.client.model_url(version.model_id),
                    status,
                });
            }
        }

        self.renderer.render_model(paths)?;
        Ok(FileOutcome::Processed)
    }
}
