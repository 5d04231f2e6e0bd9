use crate::prelude::*;

#[test]
fn agents_tools_and_skills_are_empty_with_no_runtime_config() {
    let daemon = Daemon::start();

    let agents = daemon.ctl().arg("agents").output().unwrap();
    assert_eq!(String::from_utf8_lossy(&agents.stdout).trim(), "[]");

    let tools = daemon.ctl().arg("tools").output().unwrap();
    assert_eq!(String::from_utf8_lossy(&tools.stdout).trim(), "[]");

    let skills = daemon.ctl().arg("skills").output().unwrap();
    assert_eq!(String::from_utf8_lossy(&skills.stdout).trim(), "[]");
}

#[test]
fn a_second_daemon_cannot_start_against_the_same_state_dir() {
    let daemon = Daemon::start();

    let second = std::process::Command::new(wardend_binary())
        .env("WARDEN_STATE_DIR", daemon.state_path())
        .env("RUST_LOG", "warn")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap();

    assert!(!second.success(), "a second daemon must not acquire the same lock file");
}
