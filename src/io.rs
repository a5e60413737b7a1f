use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{EnvError, Result};

/// Atomically write `data` to `path` using a tempfile in the same directory.
///
/// Readers see either the previous content or the new content, never a
/// truncated file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let fail = |source: std::io::Error| EnvError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(fail)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(data).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}
