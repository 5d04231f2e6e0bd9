// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Agent Supervisor (§4.F) and Tool-Server Supervisor (§4.F.1): process
//! lifecycle for reasoner and tool-server subprocesses, including the
//! spawn protocol, health/idle/restart timers, and single-level subagent
//! spawn/kill with cascade cleanup.

mod agent_supervisor;
pub mod spawn;
mod tool_server_supervisor;

pub use agent_supervisor::{
    AgentSupervisor, SpawnSubagentOutcome, SpawnSubagentRequest, SupervisorError, DEFAULT_SUBAGENT_TIMEOUT_MINUTES, MAX_SUBAGENT_TIMEOUT_MINUTES,
    MAX_SUBAGENTS_PER_PARENT,
};
pub use spawn::{SpawnError, Spawned};
pub use tool_server_supervisor::{ToolServerError, ToolServerSpec, ToolServerSupervisor};
