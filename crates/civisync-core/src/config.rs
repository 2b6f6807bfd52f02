//! Run configuration.
//!
//! Built once per run (by the CLI or an embedding application), validated
//! before the batch enters, and never renegotiated mid-run.

use crate::error::{Result, SyncError};
use crate::hashing::DEFAULT_BUFFER_SIZE;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

/// What to process.
#[derive(Debug, Clone)]
pub enum Source {
    /// One container file.
    Single(PathBuf),
    /// A directory scanned recursively for container files.
    Directory(PathBuf),
}

/// Processing mode; variants are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Scan, hash, fetch and persist everything.
    #[default]
    Full,
    /// Only files absent from the processed ledger.
    OnlyNew,
    /// Only previously processed files, reusing their cached identity.
    OnlyUpdate,
    /// Only regenerate pages from existing artifacts; no network.
    OnlyHtml,
    /// Maintenance: duplicate resolution + output reconciliation.
    Clean,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Full => "full",
            Mode::OnlyNew => "only-new",
            Mode::OnlyUpdate => "only-update",
            Mode::OnlyHtml => "only-html",
            Mode::Clean => "clean",
        }
    }
}

/// Which preview assets to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImagePolicy {
    /// Just the first preview.
    #[default]
    First,
    /// Every preview the version carries.
    All,
    /// No previews at all.
    None,
}

/// Cooperative delay between files to stay under the remote service's
/// rate limit. This blocks the single worker on purpose; the design is
/// strictly sequential.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    pub min_secs: f64,
    pub max_secs: f64,
    pub enabled: bool,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_secs: 3.0,
            max_secs: 6.0,
            enabled: true,
        }
    }
}

impl PacingConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sample a uniformly random delay within the configured bounds.
    pub fn sample(&self) -> Duration {
        if self.max_secs <= self.min_secs {
            return Duration::from_secs_f64(self.min_secs.max(0.0));
        }
        let secs = rand::rng().random_range(self.min_secs..self.max_secs);
        Duration::from_secs_f64(secs)
    }
}

/// Full configuration of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: Source,
    pub output_root: PathBuf,
    pub mode: Mode,
    pub images: ImagePolicy,
    /// With `only-new`: drop files already recorded as missing.
    pub skip_missing: bool,
    pub pacing: PacingConfig,
    pub api_key: Option<String>,
    /// Read buffer size for hashing.
    pub hash_buffer_size: usize,
}

impl RunConfig {
    pub fn new(source: Source, output_root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            output_root: output_root.into(),
            mode: Mode::default(),
            images: ImagePolicy::default(),
            skip_missing: false,
            pacing: PacingConfig::default(),
            api_key: None,
            hash_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Check cross-field constraints. Mode exclusivity is already
    /// guaranteed by the enum; this catches the combinations that are
    /// representable but meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.mode == Mode::Clean && matches!(self.source, Source::Single(_)) {
            return Err(SyncError::Config {
                message: "clean can only be used with a directory source".to_string(),
            });
        }
        if self.skip_missing && self.mode != Mode::OnlyNew {
            return Err(SyncError::Config {
                message: "skip_missing only applies to only-new runs".to_string(),
            });
        }
        if self.pacing.min_secs < 0.0 || self.pacing.max_secs < self.pacing.min_secs {
            return Err(SyncError::Config {
                message: format!(
                    "invalid pacing bounds: {}..{}",
                    self.pacing.min_secs, self.pacing.max_secs
                ),
            });
        }
        if self.hash_buffer_size == 0 {
            return Err(SyncError::Config {
                message: "hash buffer size must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory_config() -> RunConfig {
        RunConfig::new(Source::Directory("/models".into()), "/out")
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(directory_config().validate().is_ok());
    }

    #[test]
    fn test_clean_requires_directory() {
        let mut config = RunConfig::new(Source::Single("/m.safetensors".into()), "/out");
        config.mode = Mode::Clean;
        assert!(config.validate().is_err());

        let mut config = directory_config();
        config.mode = Mode::Clean;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_skip_missing_requires_only_new() {
        let mut config = directory_config();
        config.skip_missing = true;
        assert!(config.validate().is_err());

        config.mode = Mode::OnlyNew;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pacing_bounds_checked() {
        let mut config = directory_config();
        config.pacing.min_secs = 6.0;
        config.pacing.max_secs = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pacing_sample_within_bounds() {
        let pacing = PacingConfig::default();
        for _ in 0..32 {
            let delay = pacing.sample().as_secs_f64();
            assert!((3.0..6.0).contains(&delay));
        }
    }

    #[test]
    fn test_pacing_sample_degenerate_bounds() {
        let pacing = PacingConfig {
            min_secs: 2.0,
            max_secs: 2.0,
            enabled: true,
        };
        assert_eq!(pacing.sample(), Duration::from_secs(2));
    }
}
