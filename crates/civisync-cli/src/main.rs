//! civisync - catalog safetensors files and fetch Civitai metadata.
//!
//! Usage: civisync --all <DIR> [flags] | civisync --single <FILE> [flags]
//!
//! Modes:
//!   (default)    scan + hash + fetch + persist
//!   --onlynew    only files not yet in the processed ledger
//!   --onlyupdate only previously processed files, reusing cached hashes
//!   --onlyhtml   only regenerate pages from existing artifacts
//!   --clean      remove data for models no longer in the target directory

use anyhow::{bail, Context};
use civisync_core::civitai::images;
use civisync_core::{
    BatchOrchestrator, ImagePolicy, Mode, NoopRenderer, RunConfig, RunOutcome, Source,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Process safetensors files and fetch Civitai data.
#[derive(Parser, Debug)]
#[command(name = "civisync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a single .safetensors file
    #[arg(long, value_name = "FILE")]
    single: Option<PathBuf>,

    /// Path to a directory containing .safetensors files
    #[arg(long, value_name = "DIR")]
    all: Option<PathBuf>,

    /// Output directory path
    #[arg(long, value_name = "DIR", default_value = "out")]
    output: PathBuf,

    /// Download all available preview images instead of just the first one
    #[arg(long)]
    images: bool,

    /// Skip downloading any preview images
    #[arg(long)]
    noimages: bool,

    /// Only process new files that haven't been processed before
    #[arg(long)]
    onlynew: bool,

    /// Skip previously missing models when used with --onlynew
    #[arg(long)]
    skipmissing: bool,

    /// Only generate pages from existing JSON data
    #[arg(long)]
    onlyhtml: bool,

    /// Only update previously processed files, skipping hash calculation
    #[arg(long)]
    onlyupdate: bool,

    /// Remove data for models that no longer exist in the target directory
    #[arg(long)]
    clean: bool,

    /// Generate JSON records for existing preview images and exit
    #[arg(long)]
    generateimagejson: bool,

    /// Disable the randomized wait between files (may trigger rate limiting)
    #[arg(long)]
    notimeout: bool,

    /// API key for the Civitai API
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,
}

impl Cli {
    /// Pairwise validation of conflicting flags, mirroring the documented
    /// CLI contract. All violations exit with code 1.
    fn validate(&self) -> anyhow::Result<()> {
        if self.single.is_none() == self.all.is_none() {
            bail!("exactly one of --single or --all must be given");
        }
        if self.images && self.noimages {
            bail!("cannot use both --images and --noimages at the same time");
        }
        if self.onlynew && self.onlyhtml {
            bail!("cannot use both --onlynew and --onlyhtml at the same time");
        }
        if self.onlyupdate && self.onlynew {
            bail!("cannot use both --onlyupdate and --onlynew at the same time");
        }
        if self.onlyupdate && self.onlyhtml {
            bail!("cannot use both --onlyupdate and --onlyhtml at the same time");
        }
        if self.clean {
            if self.all.is_none() {
                bail!("--clean can only be used with --all");
            }
            if self.onlyhtml || self.onlyupdate || self.onlynew {
                bail!("--clean cannot be used with --onlyhtml, --onlyupdate, or --onlynew");
            }
        }
        if self.skipmissing && !self.onlynew {
            bail!("--skipmissing requires --onlynew");
        }
        if self.generateimagejson && self.all.is_none() {
            bail!("--generateimagejson can only be used with --all");
        }
        Ok(())
    }

    fn mode(&self) -> Mode {
        if self.clean {
            Mode::Clean
        } else if self.onlyhtml {
            Mode::OnlyHtml
        } else if self.onlyupdate {
            Mode::OnlyUpdate
        } else if self.onlynew {
            Mode::OnlyNew
        } else {
            Mode::Full
        }
    }

    fn image_policy(&self) -> ImagePolicy {
        if self.noimages {
            ImagePolicy::None
        } else if self.images {
            ImagePolicy::All
        } else {
            ImagePolicy::First
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    cli.validate()?;
    ensure_writable_output(&cli.output)?;

    if cli.generateimagejson {
        let generated = images::generate_image_sidecars(&cli.output)?;
        info!("generated {generated} preview records");
        return Ok(());
    }

    let source = match (&cli.single, &cli.all) {
        (Some(file), None) => Source::Single(file.clone()),
        (None, Some(dir)) => Source::Directory(dir.clone()),
        _ => unreachable!("validated arguments"),
    };

    let mut config = RunConfig::new(source, &cli.output);
    config.mode = cli.mode();
    config.images = cli.image_policy();
    config.skip_missing = cli.skipmissing;
    config.api_key = cli.api_key.clone();
    if cli.notimeout {
        config.pacing.enabled = false;
    }

    let orchestrator = BatchOrchestrator::new(config, NoopRenderer)?;
    match orchestrator.run().await? {
        RunOutcome::Batch(summary) => {
            info!(
                "run complete: {} processed, {} up to date, {} skipped, {} failed (of {})",
                summary.processed,
                summary.up_to_date,
                summary.skipped,
                summary.failed,
                summary.total
            );
        }
        RunOutcome::Clean(summary) => {
            info!(
                "cleanup complete: {} duplicate groups, {} duplicates removed, {} stale directories removed, {} failures",
                summary.duplicate_groups,
                summary.removed_duplicates,
                summary.removed_dirs,
                summary.failures
            );
        }
    }

    Ok(())
}

/// Create the output directory when absent and prove it is writable.
fn ensure_writable_output(output: &Path) -> anyhow::Result<()> {
    if !output.exists() {
        std::fs::create_dir_all(output)
            .with_context(|| format!("failed to create output directory {}", output.display()))?;
        info!("created output directory {}", output.display());
    }
    tempfile::tempfile_in(output)
        .with_context(|| format!("no write permission for directory {}", output.display()))?;
    Ok(())
}
