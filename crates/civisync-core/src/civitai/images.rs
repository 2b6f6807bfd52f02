//! Preview asset handling.
//!
//! Downloads full-size preview images/videos next to the model's sidecars
//! and keeps a JSON record of each asset's remote description. Also able to
//! regenerate those records from already-persisted version sidecars.

use crate::civitai::client::CivitaiClient;
use crate::civitai::types::{VersionImage, VersionResponse};
use crate::error::Result;
use crate::sidecar::{atomic, ModelPaths, StoredRecord, PREVIEW_INFIX, VERSION_SUFFIX};
use std::path::Path;
use tracing::{debug, info, warn};

/// Extension used when the image URL does not carry one.
pub const DEFAULT_IMAGE_EXT: &str = ".jpeg";
/// Extension used for assets declared as video.
pub const VIDEO_EXT: &str = ".mp4";

/// Derive the full-size URL by dropping the `width=` path segment the
/// service inserts for thumbnails.
pub fn full_size_url(url: &str) -> String {
    let parts: Vec<&str> = url.split('/').collect();
    if parts.len() >= 2 && parts[parts.len() - 2].contains("width=") {
        let mut parts = parts;
        parts.remove(parts.len() - 2);
        return parts.join("/");
    }
    url.to_string()
}

/// Pick the on-disk extension for a preview asset (leading dot included).
pub fn preview_extension(image: &VersionImage) -> String {
    if image.is_video() {
        return VIDEO_EXT.to_string();
    }

    let last_segment = image.url.rsplit('/').next().unwrap_or("");
    let without_query = last_segment.split('?').next().unwrap_or("");
    match Path::new(without_query).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{}", ext),
        _ => DEFAULT_IMAGE_EXT.to_string(),
    }
}

/// Download one preview asset plus its JSON record.
///
/// Existing assets are not re-downloaded. Returns whether a download
/// actually happened.
pub async fn download_preview(
    client: &CivitaiClient,
    image: &VersionImage,
    paths: &ModelPaths,
    index: usize,
) -> Result<bool> {
    if image.url.is_empty() {
        return Ok(false);
    }

    let url = full_size_url(&image.url);
    let dest = paths.preview(index, &preview_extension(image));
    if dest.exists() {
        debug!("preview already present: {}", dest.display());
        return Ok(false);
    }

    info!("downloading preview {} -> {}", url, dest.display());
    client.download_to(&url, &dest).await?;

    // Remote description of the asset, next to the asset itself
    atomic::write_json(&dest.with_extension("json"), image)?;
    Ok(true)
}

/// Regenerate the JSON records for all previews already on disk, from the
/// persisted version sidecars. Returns the number of records written.
pub fn generate_image_sidecars(output_root: &Path) -> Result<usize> {
    let mut generated = 0;

    let entries =
        std::fs::read_dir(output_root).map_err(|e| crate::error::SyncError::io_with_path(e, output_root))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let model_dir = entry.path();
        if !model_dir.is_dir() {
            continue;
        }
        let Some(dir_name) = model_dir.file_name().and_then(|n| n.to_str()).map(String::from)
        else {
            continue;
        };

        let version_path = model_dir.join(format!("{dir_name}{VERSION_SUFFIX}"));
        let stored: StoredRecord<VersionResponse> = match atomic::read_json(&version_path) {
            Ok(Some(stored)) => stored,
            Ok(None) => continue,
            Err(e) => {
                warn!("skipping {}: {}", version_path.display(), e);
                continue;
            }
        };

        for (index, image) in stored.data.images.iter().enumerate() {
            let ext = if image.is_video() { VIDEO_EXT } else { DEFAULT_IMAGE_EXT };
            let preview = model_dir.join(format!("{dir_name}{PREVIEW_INFIX}_{index}{ext}"));
            if preview.exists() {
                atomic::write_json(&preview.with_extension("json"), image)?;
                generated += 1;
            }
        }
    }

    info!("generated {} preview records", generated);
    Ok(generated)
}
