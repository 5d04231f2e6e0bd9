use crate::prelude::*;

#[test]
fn ping_succeeds_once_the_daemon_is_up() {
    let daemon = Daemon::start();
    let output = daemon.ctl().arg("ping").output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "pong");
}

#[test]
fn shutdown_removes_the_control_socket() {
    let daemon = Daemon::start();
    let socket = daemon.state_path().join("control.sock");

    let status = daemon.ctl().arg("shutdown").status().unwrap();
    assert!(status.success());

    let gone = wait_for(2000, || !socket.exists());
    assert!(gone, "control socket should be removed after a clean shutdown");
}

#[test]
fn status_reports_zero_uptime_agents_jobs_and_skills_with_no_config() {
    let daemon = Daemon::start();
    let output = daemon.ctl().arg("status").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["agents"], serde_json::json!([]));
    assert_eq!(report["jobs_loaded"], 0);
    assert_eq!(report["skills_loaded"], 0);
    assert_eq!(report["halted_targets"], serde_json::json!([]));
}
