use crate::prelude::*;

#[test]
fn ping_without_a_running_daemon_fails_with_a_clear_message() {
    let state_dir = tempfile::tempdir().unwrap();
    let output = std::process::Command::new(wardenctl_binary())
        .env("WARDEN_STATE_DIR", state_dir.path())
        .arg("ping")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("daemon not running"), "stderr: {stderr}");
}

#[test]
fn halt_requires_a_target_argument() {
    let state_dir = tempfile::tempdir().unwrap();
    let output = std::process::Command::new(wardenctl_binary())
        .env("WARDEN_STATE_DIR", state_dir.path())
        .arg("halt")
        .output()
        .unwrap();

    assert!(!output.status.success());
}
