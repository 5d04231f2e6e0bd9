// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shared error-kind enumeration. Crates further out in the dependency
//! graph wrap this with `#[from]` rather than duplicating the kind list.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum OrchestratorError {
    #[error("tool server unavailable: {server}")]
    RpcUnavailable { server: String },

    #[error("tool call to {server}/{tool} timed out")]
    RpcTimeout { server: String, tool: String },

    #[error("tool blocked: {exposed_name}")]
    ToolBlocked { exposed_name: String },

    #[error("scanner blocked content from {source}: {reason}")]
    ScannerBlocked { source: String, reason: String },

    #[error("agent unavailable: {agent_id}")]
    AgentUnavailable { agent_id: String },

    #[error("agent paused: {agent_id} ({reason})")]
    AgentPaused { agent_id: String, reason: String },

    #[error("capacity exceeded: {what}")]
    CapacityExceeded { what: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("scheduler skipped {what}: {reason}")]
    SchedulerSkipped { what: String, reason: String },
}

impl OrchestratorError {
    /// Whether this error kind is ever worth surfacing to an end user
    /// (as opposed to `SchedulerSkipped`, which is log-only per §7).
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, OrchestratorError::SchedulerSkipped { .. })
    }
}
