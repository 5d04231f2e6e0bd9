// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown: lock-file acquisition, directory creation,
//! and the control socket bind/unbind.

use std::fs::File;
use std::io::Write;

use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,
    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),
    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(std::path::PathBuf, std::io::Error),
    #[error("failed to parse runtime config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("invalid orchestrator_bind_addr: {0}")]
    InvalidOrchestratorAddr(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Held for the daemon's lifetime; releases the exclusive lock on drop.
pub struct LockGuard {
    #[allow(dead_code)]
    file: File,
}

pub struct StartupResult {
    pub lock: LockGuard,
    pub listener: UnixListener,
}

/// Acquires the PID lock, creates every directory the config's paths need,
/// and binds the control socket. Cleans up the socket/lock it created if
/// any later step fails, but never touches a lock file it didn't acquire.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    let lock_file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    std::fs::create_dir_all(&config.agent_prompts_dir)?;

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path).map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!(state_dir = %config.state_dir.display(), "warden daemon started");
    Ok(StartupResult { lock: LockGuard { file: lock_file }, listener })
}

/// Removes the control socket and lock file. The lock itself is released
/// when `LockGuard` drops; this only cleans up the filesystem entries so a
/// fresh startup doesn't see stale ones.
pub fn shutdown(config: &Config) {
    if config.socket_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.socket_path) {
            warn!(error = %e, "failed to remove control socket");
        }
    }
    if config.lock_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.lock_path) {
            warn!(error = %e, "failed to remove lock file");
        }
    }
    info!("warden daemon shutdown complete");
}
