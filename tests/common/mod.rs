#![allow(dead_code)]
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;

/// Manifest written into the cache so no test reaches the network.
pub const MANIFEST: &str = r#"[
  {"ref": "trunk", "tag": "trunk", "cacheable": false, "locked": false, "prerelease": true},
  {"ref": "6.5.3", "tag": "6.5", "cacheable": true, "locked": false, "prerelease": false},
  {"ref": "6.4.2", "tag": "6.4", "cacheable": true, "locked": false, "prerelease": false}
]"#;

/// An isolated wpdev home: environments, cache and working directory all
/// live in one temporary directory.
pub struct TestHome {
    pub dir: TempDir,
}

impl TestHome {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        dir.child("cache").create_dir_all().unwrap();
        dir.child("cache/wordpress-versions.json")
            .write_str(MANIFEST)
            .unwrap();
        dir.child("work").create_dir_all().unwrap();
        Self { dir }
    }

    pub fn environments(&self) -> PathBuf {
        self.dir.path().join("environments")
    }

    pub fn work(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn descriptor(&self, slug: &str) -> PathBuf {
        self.environments().join(slug).join("instance_data.json")
    }

    /// `wpdev` with this home and no terminal.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("wpdev").unwrap();
        cmd.current_dir(self.work())
            .env("WPDEV_HOME", self.environments())
            .env("WPDEV_CACHE_DIR", self.dir.path().join("cache"))
            .env("WPDEV_VERSIONS_URL", "http://127.0.0.1:9/versions.json")
            .env("WPDEV_NON_INTERACTIVE", "1")
            .env_remove("WPDEV_SLUG")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn read_descriptor(&self, slug: &str) -> serde_json::Value {
        let content = std::fs::read_to_string(self.descriptor(slug)).unwrap();
        serde_json::from_str(&content).unwrap()
    }
}

/// Whether a container engine answers `docker info`.
pub fn docker_available() -> bool {
    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Remove everything a compose project left behind, using the docker CLI
/// directly so it works even when wpdev state is broken.
pub fn docker_cleanup(project: &str) {
    let label = format!("label=com.docker.compose.project={}", project);
    for (kind, list_args) in [
        ("container", vec!["ps", "-a", "--filter", &label, "--format", "{{.ID}}"]),
        ("volume", vec!["volume", "ls", "--filter", &label, "--format", "{{.Name}}"]),
    ] {
        let Ok(output) = std::process::Command::new("docker").args(&list_args).output() else {
            continue;
        };
        let names = String::from_utf8_lossy(&output.stdout);
        for name in names.lines().filter(|l| !l.is_empty()) {
            let _ = std::process::Command::new("docker")
                .args([kind, "rm", "-f", name])
                .output();
        }
    }
}

pub fn write_project_file(dir: &Path, content: &str) {
    std::fs::write(dir.join(".wpdev.yml"), content).unwrap();
}
