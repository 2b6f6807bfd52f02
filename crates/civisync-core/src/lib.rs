//! civisync-core — engine for cataloging safetensors model files against
//! the Civitai metadata service.
//!
//! Given a directory of container files, the engine establishes a content
//! identity for each (embedded header hint or streaming SHA256), fetches
//! the matching remote version and model records, persists everything as
//! JSON sidecars under one output subdirectory per model, and keeps a
//! crash-tolerant ledger of what has been processed. Duplicate copies and
//! vanished sources are reconciled by an explicit maintenance pass.
//!
//! # Example
//!
//! ```rust,ignore
//! use civisync_core::{BatchOrchestrator, NoopRenderer, RunConfig, RunOutcome, Source};
//!
//! #[tokio::main]
//! async fn main() -> civisync_core::Result<()> {
//!     let config = RunConfig::new(Source::Directory("/models".into()), "out");
//!     let orchestrator = BatchOrchestrator::new(config, NoopRenderer)?;
//!
//!     if let RunOutcome::Batch(summary) = orchestrator.run().await? {
//!         println!("{} of {} files processed", summary.succeeded(), summary.total);
//!     }
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod civitai;
pub mod config;
pub mod dedup;
pub mod error;
pub mod hashing;
pub mod header;
pub mod ledger;
pub mod missing;
pub mod naming;
pub mod render;
pub mod scan;
pub mod sidecar;
pub mod staleness;

// Re-export commonly used types
pub use batch::{BatchOrchestrator, FileOutcome, RunOutcome, RunSummary};
pub use civitai::{CivitaiClient, FetchOutcome, ModelResponse, VersionResponse};
pub use config::{ImagePolicy, Mode, PacingConfig, RunConfig, Source};
pub use dedup::{CleanSummary, DuplicateGroups, DuplicateMember, GroupResolution};
pub use error::{Result, SyncError};
pub use header::{parse_header, ParsedHeader};
pub use ledger::ProcessedLedger;
pub use missing::MissingRegistry;
pub use naming::sanitize_filename;
pub use render::{NoopRenderer, PageRenderer};
pub use sidecar::{HashSidecar, ModelPaths, StoredRecord};
pub use staleness::needs_update;
