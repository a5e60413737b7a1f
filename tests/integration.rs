//! Full lifecycle against a real container engine.
//!
//! Run with `cargo test --features integration`. Tests skip themselves
//! when no engine answers.
#![cfg(feature = "integration")]

mod common;

use std::time::Duration;

use common::{docker_available, docker_cleanup, TestHome};
use predicates::prelude::*;

struct Cleanup(&'static str);

impl Drop for Cleanup {
    fn drop(&mut self) {
        docker_cleanup(self.0);
    }
}

#[test]
fn lifecycle_create_start_stop_destroy() {
    if !docker_available() {
        eprintln!("skipping: no container engine available");
        return;
    }
    let home = TestHome::new();
    let _cleanup = Cleanup("wpdevitlifecycle");

    home.cmd()
        .args(["-s", "it-lifecycle", "create", "--wordpress", "6.5"])
        .assert()
        .success();

    home.cmd()
        .args([
            "-s",
            "it-lifecycle",
            "start",
            "--skip-wp-versions-check",
            "--timeout",
            "5m",
        ])
        .timeout(Duration::from_secs(600))
        .assert()
        .success()
        .stdout(predicate::str::contains("UP"));

    home.cmd()
        .args(["-s", "it-lifecycle", "info"])
        .assert()
        .success()
        .stdout(predicate::str::contains("running"));

    home.cmd()
        .args(["-s", "it-lifecycle", "exec", "--", "wp", "core", "version"])
        .timeout(Duration::from_secs(120))
        .assert()
        .success();

    home.cmd()
        .args(["-s", "it-lifecycle", "stop"])
        .assert()
        .success();

    home.cmd()
        .args(["-s", "it-lifecycle", "destroy"])
        .assert()
        .success();
    assert!(!home.environments().join("it-lifecycle").exists());

    home.cmd()
        .args(["-s", "it-lifecycle", "destroy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already destroyed"));
}

#[test]
fn soft_destroy_keeps_the_descriptor() {
    if !docker_available() {
        eprintln!("skipping: no container engine available");
        return;
    }
    let home = TestHome::new();
    let _cleanup = Cleanup("wpdevitsoft");

    home.cmd()
        .args(["-s", "it-soft", "create"])
        .assert()
        .success();
    home.cmd()
        .args(["-s", "it-soft", "destroy", "--soft"])
        .assert()
        .success();
    assert!(home.descriptor("it-soft").is_file());
}
