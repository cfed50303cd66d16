// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end checks of the binary without a reachable SSH server.

use std::process::Command;

fn binary() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_qstat-exporter"));
    cmd.env_remove("RUST_LOG")
        .env_remove("QSTAT_EXPORTER_PASSWORD")
        .env("XDG_CONFIG_HOME", std::env::temp_dir().join("qstat-exporter-cli-test"));
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let output = binary().arg("--help").output().expect("Failed to run binary");
    assert!(output.status.success());

    let help = String::from_utf8_lossy(&output.stdout);
    assert!(help.contains("collect"));
    assert!(help.contains("watch"));
    assert!(help.contains("--strict-host-key-checking"));
}

#[test]
fn test_missing_host_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let output = binary()
        .current_dir(dir.path())
        .args(["-u", "alice", "collect"])
        .output()
        .expect("Failed to run binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No host configured"), "stderr: {stderr}");
}

#[test]
fn test_unsafe_username_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = binary()
        .current_dir(dir.path())
        .args(["-H", "127.0.0.1", "-u", "alice;reboot", "collect"])
        .output()
        .expect("Failed to run binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid characters in username"), "stderr: {stderr}");
}

#[test]
fn test_failed_pass_exits_nonzero() {
    // Bind then drop a listener to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port().to_string();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let output = binary()
        .current_dir(dir.path())
        .env("QSTAT_EXPORTER_PASSWORD", "secret")
        .args([
            "-H",
            "127.0.0.1",
            "-p",
            &port,
            "-u",
            "alice",
            "--auth",
            "password",
            "--timeout",
            "3",
            "--strict-host-key-checking",
            "no",
            "collect",
        ])
        .output()
        .expect("Failed to run binary");

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("# HELP qstat_user_jobs"));
    assert!(!stdout.contains("qstat_user_jobs{"));
}

#[test]
fn test_config_file_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("site.yaml");
    std::fs::write(&config, "user: alice\nauth:\n  method: password\n").unwrap();

    let output = binary()
        .current_dir(dir.path())
        .args(["--config", config.to_str().unwrap(), "-H", "127.0.0.1", "collect"])
        .output()
        .expect("Failed to run binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no password given"), "stderr: {stderr}");
}
