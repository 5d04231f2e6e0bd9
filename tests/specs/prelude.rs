//! Test helpers for behavioral specifications: spawns the real `wardend`
//! and `wardenctl` binaries against an isolated state directory.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};

/// Resolves a sibling binary built into the same `target/debug`, falling
/// back to a path relative to the test binary itself (works under
/// `cargo llvm-cov` and other out-of-tree test runners).
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }
    standard
}

pub fn wardend_binary() -> PathBuf {
    binary_path("wardend")
}

pub fn wardenctl_binary() -> PathBuf {
    binary_path("wardenctl")
}

/// A running `wardend` process against a fresh, isolated state directory.
/// Requests its own shutdown (and reaps the process) on drop.
pub struct Daemon {
    state_dir: tempfile::TempDir,
    child: Child,
}

impl Daemon {
    /// Spawns `wardend` with no `runtime.toml` (empty agent/tool-server/
    /// binding config) and waits for the control socket to appear.
    pub fn start() -> Self {
        let state_dir = tempfile::tempdir().unwrap();
        let child = Command::new(wardend_binary())
            .env("WARDEN_STATE_DIR", state_dir.path())
            .env("RUST_LOG", "warn")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .expect("wardend should spawn");

        let socket = state_dir.path().join("control.sock");
        let started = wait_for(2000, || socket.exists());
        assert!(started, "control socket never appeared within 2s");

        Self { state_dir, child }
    }

    pub fn state_path(&self) -> &Path {
        self.state_dir.path()
    }

    /// A `wardenctl` command pre-wired to this daemon's state directory.
    pub fn ctl(&self) -> Command {
        let mut cmd = Command::new(wardenctl_binary());
        cmd.env("WARDEN_STATE_DIR", self.state_dir.path());
        cmd
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let mut cmd = self.ctl();
        cmd.arg("shutdown").stdout(std::process::Stdio::null()).stderr(std::process::Stdio::null());
        let _ = cmd.status();
        let _ = self.child.wait();
    }
}

/// Poll a condition until it returns true or the timeout elapses.
pub fn wait_for<F: FnMut() -> bool>(timeout_ms: u64, mut condition: F) -> bool {
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}
