//! Covers the round-trip invariant: `Halt(x); Resume(x)` leaves
//! `IsTargetHalted(x) = false`.

use crate::prelude::*;

#[test]
fn halt_then_resume_clears_the_target() {
    let daemon = Daemon::start();

    let halt = daemon.ctl().args(["halt", "inngest"]).output().unwrap();
    assert!(halt.status.success());

    let report = status_of(&daemon);
    assert_eq!(report["halted_targets"], serde_json::json!(["inngest"]));

    let resume = daemon.ctl().args(["resume", "inngest"]).output().unwrap();
    assert!(resume.status.success());

    let report = status_of(&daemon);
    assert_eq!(report["halted_targets"], serde_json::json!([]));
}

#[test]
fn halt_all_is_distinct_from_halting_a_single_target() {
    let daemon = Daemon::start();

    daemon.ctl().args(["halt", "channels"]).output().unwrap();
    let report = status_of(&daemon);
    assert_eq!(report["halted_targets"], serde_json::json!(["channels"]));

    daemon.ctl().args(["halt", "*"]).output().unwrap();
    let report = status_of(&daemon);
    let halted = report["halted_targets"].as_array().unwrap();
    assert!(halted.iter().any(|t| t == "*"));
    assert!(halted.iter().any(|t| t == "channels"));
}

fn status_of(daemon: &Daemon) -> serde_json::Value {
    let output = daemon.ctl().arg("status").output().unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}
