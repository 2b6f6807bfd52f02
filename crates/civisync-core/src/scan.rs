//! Recursive discovery of container files.

use crate::error::{Result, SyncError};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extension of the tensor container format we catalog.
pub const CONTAINER_EXTENSION: &str = "safetensors";

/// Recursively find every container file under `dir`, sorted by path so
/// discovery order is stable between runs.
pub fn find_container_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SyncError::NotADirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| SyncError::Io {
            message: format!("directory walk failed under {}: {}", dir.display(), e),
            path: Some(dir.to_path_buf()),
            source: e.into_io_error(),
        })?;

        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some(CONTAINER_EXTENSION)
        {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Whether a single path looks like a container file.
pub fn is_container_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(CONTAINER_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.safetensors"), b"x").unwrap();
        std::fs::write(dir.path().join("sub/a.safetensors"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let files = find_container_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("b.safetensors"));
        assert!(files[1].ends_with("sub/a.safetensors"));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = find_container_files(&dir.path().join("nope"));
        assert!(matches!(result, Err(SyncError::NotADirectory(_))));
    }

    #[test]
    fn test_is_container_file() {
        assert!(is_container_file(Path::new("model.safetensors")));
        assert!(!is_container_file(Path::new("model.ckpt")));
    }
}
