pub mod coerce;
pub mod model;
pub mod pipeline;
pub mod prompt;
pub mod resolve;

use std::path::Path;

use model::{ProjectConfig, CONFIG_FILE_NAME};

/// Find and load the project configuration file nearest to `cwd`.
///
/// A missing file is not an error; a file that exists but cannot be
/// parsed or carries an unsupported version is.
pub fn discover(cwd: &Path) -> crate::error::Result<Option<ProjectConfig>> {
    let Some(path) = resolve::find_config(cwd, CONFIG_FILE_NAME, resolve::MAX_SEARCH_DEPTH) else {
        return Ok(None);
    };
    tracing::debug!(path = %path.display(), "using project configuration");
    ProjectConfig::load(&path).map(Some)
}
