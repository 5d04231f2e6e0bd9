// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers for spawning and tearing down child processes with bounded
//! waits, shared by the RPC Client and Reasoner spawn protocol.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::timeout;

/// Grace period between SIGTERM and SIGKILL when stopping a subprocess.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// How long to wait for a dynamic-port child to print `LISTENING_PORT=<n>`.
pub const PORT_ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(15);

/// How long to wait for a freshly spawned reasoner to answer `/health`.
pub const HEALTH_READY_TIMEOUT: Duration = Duration::from_secs(15);

/// Bounded single health probe.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Default per-call RPC timeout.
pub const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub fn spawn_piped(command: &str, args: &[String], env: &[(String, String)], cwd: Option<&std::path::Path>) -> std::io::Result<Child> {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .envs(env.iter().map(|(k, v)| (k.clone(), v.clone())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    cmd.spawn()
}

/// Terminate a child with SIGTERM, escalating to SIGKILL after
/// [`STOP_GRACE_PERIOD`] if it hasn't exited.
pub async fn stop_gracefully(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGTERM);
    }

    match timeout(STOP_GRACE_PERIOD, child.wait()).await {
        Ok(result) => result.map(|_| ()),
        Err(_) => child.start_kill().and(Ok(())),
    }
}
