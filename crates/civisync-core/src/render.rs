//! Page-generation seam.
//!
//! Templating and static-site rendering live outside this engine; the
//! orchestrator only knows when a model's artifacts are complete enough to
//! render. Embedders plug a real renderer in here.

use crate::error::Result;
use crate::sidecar::ModelPaths;
use std::path::Path;
use tracing::debug;

/// Hook invoked after a model's artifacts are persisted and at the end of
/// a run for the catalog index.
pub trait PageRenderer {
    fn render_model(&self, paths: &ModelPaths) -> Result<()>;
    fn render_index(&self, output_root: &Path) -> Result<()>;
}

/// Renderer that does nothing; used when no page generation is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRenderer;

impl PageRenderer for NoopRenderer {
    fn render_model(&self, paths: &ModelPaths) -> Result<()> {
        debug!("page rendering disabled, skipping {}", paths.stem);
        Ok(())
    }

    fn render_index(&self, output_root: &Path) -> Result<()> {
        debug!(
            "page rendering disabled, skipping index for {}",
            output_root.display()
        );
        Ok(())
    }
}
