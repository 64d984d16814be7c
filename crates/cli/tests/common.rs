// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test binaries,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;

pub use predicates::prelude::*;
pub use tempfile::TempDir;

/// `offsync` with its state confined to `state` and logging quiet.
pub fn offsync(state: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("offsync");
    cmd.arg("--state-dir").arg(state).env_remove("OFFSYNC_STATE_DIR").env("OFFSYNC_LOG", "off");
    cmd
}

/// Enqueues a request and returns the printed id.
pub fn enqueue(state: &Path, args: &[&str]) -> String {
    let output = offsync(state).arg("enqueue").args(args).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn status_json(state: &Path) -> serde_json::Value {
    let output = offsync(state).args(["status", "--json"]).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}
