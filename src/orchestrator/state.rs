use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::engine::ContainerSummary;

/// Lifecycle state of one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    /// Nothing on disk.
    Absent,
    /// Descriptor written, no containers yet.
    Initialized,
    Running,
    Stopped,
    /// Removed by `destroy`.
    Destroyed,
}

impl EnvironmentState {
    /// Derive the state from what is on disk and what the engine reports.
    pub fn derive(descriptor_exists: bool, destroyed: bool, containers: &[ContainerSummary]) -> Self {
        if !descriptor_exists {
            return if destroyed { Self::Destroyed } else { Self::Absent };
        }
        if containers.is_empty() {
            Self::Initialized
        } else if containers.iter().any(|c| c.running) {
            Self::Running
        } else {
            Self::Stopped
        }
    }
}

impl fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Destroyed => "destroyed",
        })
    }
}

/// Stack files already accepted by the engine in this session.
///
/// Owned by an [`Orchestrator`](super::Orchestrator) rather than a global,
/// so independent sessions never see each other's entries.
#[derive(Debug, Default)]
pub struct StackCache {
    initialized: Mutex<HashSet<PathBuf>>,
}

impl StackCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self, file: &Path) -> bool {
        self.entries().contains(file)
    }

    pub fn mark(&self, file: &Path) {
        self.entries().insert(file.to_path_buf());
    }

    pub fn forget(&self, file: &Path) {
        self.entries().remove(file);
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.initialized.lock().unwrap_or_else(|e| e.into_inner())
    }
}
