//! Filesystem-safe name sanitization.
//!
//! Output directories and sidecar files are named after the source file's
//! stem; this module makes that stem safe across platforms.

use regex::Regex;
use std::sync::LazyLock;

/// Brackets, quotes and comment characters that get replaced outright.
static GROUPING_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r##"[\[\]\(\)\{\}'"#]"##).unwrap());

/// Characters reserved on NTFS.
static NTFS_RESERVED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());

/// Anything left that is not a word character or hyphen.
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\-]").unwrap());

/// Runs of consecutive underscores.
static UNDERSCORE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

/// Create a clean, filesystem-friendly name from a file stem.
///
/// # Examples
///
/// ```
/// use civisync_core::naming::sanitize_filename;
///
/// assert_eq!(sanitize_filename("My Model (v1.0)"), "My_Model_v1_0");
/// assert_eq!(sanitize_filename("lora[test]#final"), "lora_test_final");
/// ```
pub fn sanitize_filename(filename: &str) -> String {
    let sanitized = GROUPING_CHARS.replace_all(filename, "_");
    let sanitized = NTFS_RESERVED.replace_all(&sanitized, "_");
    let sanitized = NON_WORD.replace_all(&sanitized, "_");

    // Strip leading/trailing underscores and dots before collapsing runs
    let sanitized = sanitized.trim_matches(|c| c == '.' || c == '_');

    UNDERSCORE_RUNS.replace_all(sanitized, "_").into_owned()
}
