// Utility Functions
// Project root detection for sweep commands

use std::path::{Path, PathBuf};

/// Directory whose presence marks a sweep project root
pub const INPUTS_DIR: &str = "inputs";

/// Find the sweep project root by walking up from the given starting path.
///
/// The project root is the closest ancestor holding an `inputs/` directory,
/// which carries the calibration file, helpers and the per-set `user-data/`
/// tree. Returns `None` when no ancestor qualifies.
///
/// # Arguments
/// * `start` - The starting directory to search from
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().ok()?;
    start
        .ancestors()
        .find(|ancestor| ancestor.join(INPUTS_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// Resolve the project root for a sweep.
///
/// An explicit root wins. Otherwise searches upward from the current
/// directory and falls back to the current directory itself.
pub fn resolve_project_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(root) = explicit {
        return root.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_project_root(&cwd).unwrap_or(cwd)
}
