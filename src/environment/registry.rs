use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::environment::descriptor::{InstanceDescriptor, DESCRIPTOR_FILE};
use crate::error::{EnvError, Result};

/// Directory under the base that records destroyed environments.
const TOMBSTONE_DIR: &str = ".destroyed";

const MAX_SLUG_LEN: usize = 63;

/// Maps slugs to environment directories under one base directory.
#[derive(Debug, Clone)]
pub struct EnvironmentRegistry {
    base: PathBuf,
}

/// Check that a slug can name a directory and a compose project.
pub fn validate_slug(slug: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(EnvError::InvalidSlug {
            slug: slug.to_string(),
            reason: reason.to_string(),
        })
    };
    if slug.is_empty() {
        return invalid("it is empty");
    }
    if slug.len() > MAX_SLUG_LEN {
        return invalid("it is longer than 63 characters");
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return invalid("only lowercase letters, digits and hyphens are allowed");
    }
    if slug.starts_with('-') {
        return invalid("it must start with a letter or digit");
    }
    Ok(())
}

impl EnvironmentRegistry {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The directory of `slug`. Deterministic; touches nothing on disk.
    pub fn path_for(&self, slug: &str) -> Result<PathBuf> {
        validate_slug(slug)?;
        Ok(self.base.join(slug))
    }

    /// An environment exists once its descriptor file does.
    pub fn exists(path: &Path) -> bool {
        path.join(DESCRIPTOR_FILE).is_file()
    }

    /// Slugs of every environment directory, sorted. A missing base
    /// directory means no environments.
    pub fn list_all(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(EnvError::Unreadable {
                    slug: "*".to_string(),
                    path: self.base.clone(),
                    source,
                })
            }
        };

        let mut slugs: Vec<String> = entries
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();
        slugs.sort();
        Ok(slugs)
    }

    /// Read the descriptor of `slug`.
    ///
    /// IO failures and parse failures are reported as distinct errors.
    pub fn read(&self, slug: &str) -> Result<InstanceDescriptor> {
        let dir = self.path_for(slug)?;
        let path = dir.join(DESCRIPTOR_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EnvError::NotFound {
                    slug: slug.to_string(),
                })
            }
            Err(source) => {
                return Err(EnvError::Unreadable {
                    slug: slug.to_string(),
                    path,
                    source,
                })
            }
        };
        InstanceDescriptor::from_json(&content).map_err(|source| EnvError::Corrupt {
            slug: slug.to_string(),
            path,
            source,
        })
    }

    /// Persist a descriptor atomically. Clears any destroy marker.
    pub fn write(&self, descriptor: &InstanceDescriptor) -> Result<PathBuf> {
        let dir = self.path_for(&descriptor.slug)?;
        let path = dir.join(DESCRIPTOR_FILE);
        let json = descriptor
            .to_json()
            .map_err(|e| EnvError::WriteFailed {
                path: path.clone(),
                source: std::io::Error::other(e),
            })?;
        crate::io::atomic_write(&path, json.as_bytes())?;
        self.clear_tombstone(&descriptor.slug);
        debug!(slug = %descriptor.slug, path = %path.display(), "descriptor written");
        Ok(dir)
    }

    /// Delete the environment directory and leave a destroy marker.
    pub fn remove(&self, slug: &str) -> Result<()> {
        let dir = self.path_for(slug)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(EnvError::WriteFailed { path: dir, source }),
        }
        self.mark_destroyed(slug)
    }

    fn tombstone(&self, slug: &str) -> PathBuf {
        self.base.join(TOMBSTONE_DIR).join(slug)
    }

    fn mark_destroyed(&self, slug: &str) -> Result<()> {
        let marker = self.tombstone(slug);
        let stamp = chrono::Utc::now().to_rfc3339();
        crate::io::atomic_write(&marker, stamp.as_bytes())
    }

    /// Whether `slug` was destroyed by this tool and not recreated since.
    pub fn was_destroyed(&self, slug: &str) -> bool {
        self.tombstone(slug).is_file()
    }

    fn clear_tombstone(&self, slug: &str) {
        let marker = self.tombstone(slug);
        match std::fs::remove_file(&marker) {
            Ok(()) => debug!(slug, "cleared destroy marker"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                slug,
                path = %marker.display(),
                error = %e,
                "could not clear destroy marker"
            ),
        }
    }
}
