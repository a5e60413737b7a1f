use std::path::{Path, PathBuf};

/// How many directories above the start directory are searched.
pub const MAX_SEARCH_DEPTH: usize = 10;

/// Walk up the directory tree from `start`, checking for `filename` at each
/// level. Stops at the first match, at the filesystem root, or after
/// `max_depth` parent directories.
pub fn find_config(start: &Path, filename: &str, max_depth: usize) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    for _ in 0..=max_depth {
        let candidate = current.join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
    None
}
