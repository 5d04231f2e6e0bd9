// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: `WARDEN_STATE_DIR` > `XDG_STATE_HOME`/warden > `~/.local/state/warden`
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("WARDEN_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("warden"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/warden"))
}

/// Default chat to notify when an agent has no configured notify target.
pub fn default_notify_chat() -> Option<String> {
    std::env::var("WARDEN_DEFAULT_NOTIFY_CHAT").ok()
}

/// `fail_open` (missing/unreachable scanner lets content through) or
/// `fail_closed` (blocks content when the scanner can't be reached).
/// Defaults to `fail_closed`.
pub fn scanner_fail_open() -> bool {
    std::env::var("WARDEN_SCANNER_FAIL_MODE").map(|v| v == "fail_open").unwrap_or(false)
}
