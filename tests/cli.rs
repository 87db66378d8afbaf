// ============================================================================
// File: tests/cli.rs
// ----------------------------------------------------------------------------
// End-to-end tests for the apcon binary. Every invocation points the
// transport paths into an empty temp dir so the host's real daemon, if any,
// stays out of the picture.
// ============================================================================

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

fn apcon(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("apcon").expect("binary built");
    cmd.arg("--api-socket")
        .arg(dir.child("api.sock").path())
        .arg("--ctrl-dir")
        .arg(dir.child("ctrl").path())
        .arg("--vendor-manifest")
        .arg(dir.child("vendor.json").path());
    cmd
}

#[cfg(target_os = "linux")]
#[test]
fn probe_reports_undeclared_transports() {
    let dir = TempDir::new().expect("temp dir");
    apcon(&dir)
        .arg("probe")
        .assert()
        .success()
        .stdout(predicate::str::contains("http-api: not declared"))
        .stdout(predicate::str::contains("ctrl-socket: not declared"))
        .stdout(predicate::str::contains("vendor extension: none"));
}

#[test]
fn probe_reports_declared_vendor_extension() {
    let dir = TempDir::new().expect("temp dir");
    dir.child("vendor.json")
        .write_str(r#"{"versions": ["1.0", "1.1"]}"#)
        .expect("write manifest");

    apcon(&dir)
        .arg("probe")
        .assert()
        .success()
        .stdout(predicate::str::contains("vendor extension: 1.1"));
}

#[test]
fn dump_without_daemon_prints_state() {
    let dir = TempDir::new().expect("temp dir");
    apcon(&dir)
        .arg("dump")
        .assert()
        .success()
        .stdout(predicate::str::contains("state: uninitialized"))
        .stdout(predicate::str::contains("active backend: none"));
}

#[test]
fn start_without_arguments_is_a_usage_error() {
    let dir = TempDir::new().expect("temp dir");
    apcon(&dir)
        .arg("start")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn sae_requires_a_passphrase() {
    let dir = TempDir::new().expect("temp dir");
    apcon(&dir)
        .args(["start", "wlan0", "testnet", "--sae"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn owe_and_passphrase_are_mutually_exclusive() {
    let dir = TempDir::new().expect("temp dir");
    apcon(&dir)
        .args(["start", "wlan0", "testnet", "--owe", "--passphrase", "hunter2hunter2"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn unknown_band_is_rejected_before_any_daemon_talk() {
    let dir = TempDir::new().expect("temp dir");
    apcon(&dir)
        .args(["start", "wlan0", "testnet", "--band", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown band 3"));
}

#[test]
fn stop_without_any_backend_fails() {
    let dir = TempDir::new().expect("temp dir");
    apcon(&dir)
        .args(["stop", "wlan0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no usable backend"));
}

#[test]
fn disconnect_rejects_a_malformed_client_address() {
    let dir = TempDir::new().expect("temp dir");
    apcon(&dir)
        .args(["disconnect", "wlan0", "not-a-mac"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsing client address"));
}
