// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests that drive the compiled `ringpost` binary.

use std::path::Path;
use std::process::{Command, Output};

fn ringpost(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ringpost"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("binary should run")
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("ringpost.toml");
    let db = dir.join("ringpost.db");
    std::fs::write(
        &path,
        format!(
            "[storage]\ndatabase_path = \"{}\"\n\n[telephony]\nbase_url = \"http://127.0.0.1:9\"\n",
            db.display()
        ),
    )
    .unwrap();
    path
}

#[test]
fn ports_register_list_and_reset() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let out = ringpost(
        &config,
        &["ports", "register", "--owner", "owner-1", "--number", "1", "--label", "gsm-1"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = ringpost(&config, &["ports", "list", "--owner", "owner-1", "--json"]);
    assert!(out.status.success());
    let ports: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(ports.as_array().unwrap().len(), 1);
    assert_eq!(ports[0]["status"], "available");
    assert_eq!(ports[0]["device_label"], "gsm-1");

    let out = ringpost(&config, &["ports", "reset", "--owner", "owner-1"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("reset 1 port(s)"));
}

#[test]
fn unknown_job_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let out = ringpost(&config, &["jobs", "status", "job-x", "--owner", "owner-1"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("job job-x not found"));
}

#[test]
fn invalid_config_is_rendered_and_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[dialer]\ndial_timout_secs = 10\n").unwrap();

    let out = ringpost(&path, &["ports", "list", "--owner", "o"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("dial_timout_secs"));
}
