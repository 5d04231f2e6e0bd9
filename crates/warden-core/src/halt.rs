// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global and per-target halt flags consulted by the Scheduler and the
//! Dispatch Pipeline.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Halt target naming every subsystem that can be independently paused,
/// plus `*` which pauses all of them.
pub const HALT_ALL: &str = "*";

#[derive(Debug, Default)]
pub struct HaltState {
    flags: RwLock<HashMap<String, bool>>,
}

impl HaltState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn halt(&self, target: impl Into<String>) {
        self.flags.write().insert(target.into(), true);
    }

    pub fn resume(&self, target: &str) {
        self.flags.write().remove(target);
    }

    /// True if `target` itself or the `*` wildcard is halted.
    pub fn is_halted(&self, target: &str) -> bool {
        let flags = self.flags.read();
        flags.get(target).copied().unwrap_or(false) || flags.get(HALT_ALL).copied().unwrap_or(false)
    }
}
