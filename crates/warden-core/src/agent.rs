// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent data model: the static [`AgentDefinition`] an operator configures
//! and the runtime-owned [`ManagedAgent`] the Agent Supervisor mutates.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::id::AgentId;

/// Cost-control knobs for one agent, enforced by the reasoner and reported
/// back through the `paused` field of `ProcessMessage`/`ExecuteSkill`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostControls {
    pub short_window_minutes: u32,
    pub spike_multiplier: f64,
    pub hard_cap_tokens_per_hour: u64,
    pub minimum_baseline_tokens: u64,
    pub notify_channel: Option<String>,
    pub notify_chat_id: Option<String>,
}

/// Static, operator-authored configuration for one agent. Immutable after
/// load except for the one dynamic path: subagent definitions derived from
/// a parent's at spawn time (see `AgentDefinition::derive_subagent`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub agent_id: AgentId,
    pub enabled: bool,
    /// 0 means the reasoner picks a dynamic port and announces it on stdout.
    pub desired_port: u16,
    pub llm_provider: String,
    pub model: String,
    pub system_prompt: Option<String>,
    /// Glob patterns against exposed tool names (`<server>_<tool>`). Empty = all.
    pub allowed_tools: Vec<String>,
    pub denied_tools: Vec<String>,
    pub max_steps: u32,
    pub idle_timeout_minutes: u32,
    pub cost_controls: Option<CostControls>,
    pub command: String,
    pub args: Vec<String>,
}

impl AgentDefinition {
    /// Builds a definition for an ephemeral, single-level subagent by
    /// inheriting from `self` (the parent) and applying the overlay rules
    /// from the subagent spawn protocol: forced dynamic port, tool
    /// intersection, and an always-denied `spawn_subagent` tool so a
    /// subagent can never itself spawn a subagent.
    pub fn derive_subagent(
        &self,
        subagent_id: AgentId,
        task_prompt: String,
        model_override: Option<String>,
        allowed_override: Option<Vec<String>>,
        denied_override: Vec<String>,
    ) -> Self {
        let allowed_tools = match allowed_override {
            Some(overrides) => {
                if self.allowed_tools.is_empty() {
                    overrides
                } else {
                    overrides
                        .into_iter()
                        .filter(|t| self.allowed_tools.iter().any(|p| p == t))
                        .collect()
                }
            }
            None => self.allowed_tools.clone(),
        };

        let mut denied_tools = self.denied_tools.clone();
        denied_tools.extend(denied_override);
        denied_tools.push("spawn_subagent".to_string());
        denied_tools.dedup();

        Self {
            agent_id: subagent_id,
            enabled: true,
            desired_port: 0,
            llm_provider: self.llm_provider.clone(),
            model: model_override.unwrap_or_else(|| self.model.clone()),
            system_prompt: Some(task_prompt),
            allowed_tools,
            denied_tools,
            max_steps: self.max_steps,
            idle_timeout_minutes: self.idle_timeout_minutes,
            cost_controls: self.cost_controls.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
        }
    }
}

/// Runtime lifecycle state of a [`ManagedAgent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Stopped => "stopped",
            AgentState::Starting => "starting",
            AgentState::Running => "running",
            AgentState::Stopping => "stopping",
        };
        write!(f, "{s}")
    }
}

/// Runtime-owned state for one registered or spawned agent. Mutated
/// exclusively by the Agent Supervisor under the agent's own mutex.
#[derive(Debug)]
pub struct ManagedAgent {
    pub definition: AgentDefinition,
    pub state: AgentState,
    pub available: bool,
    pub restart_count: u32,
    pub consecutive_unhealthy: u32,
    pub restarting: bool,
    pub last_restart_at: Option<Instant>,
    pub last_activity_at: Instant,
    pub paused: bool,
    pub pause_reason: Option<String>,
    pub parent_agent_id: Option<AgentId>,
    pub is_subagent: bool,
    pub auto_kill_deadline: Option<Instant>,
    pub actual_port: Option<u16>,
    pub prompt_file_path: Option<PathBuf>,
    pub pid: Option<u32>,
}

impl ManagedAgent {
    pub fn new(definition: AgentDefinition, now: Instant) -> Self {
        Self {
            definition,
            state: AgentState::Stopped,
            available: false,
            restart_count: 0,
            consecutive_unhealthy: 0,
            restarting: false,
            last_restart_at: None,
            last_activity_at: now,
            paused: false,
            pause_reason: None,
            parent_agent_id: None,
            is_subagent: false,
            auto_kill_deadline: None,
            actual_port: None,
            prompt_file_path: None,
            pid: None,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.definition.agent_id
    }

    /// Invariant: `state == stopped` implies no process handle and not available.
    pub fn assert_invariants(&self) {
        debug_assert!(
            self.state != AgentState::Stopped || (self.pid.is_none() && !self.available),
            "stopped agent must have no process handle and not be available"
        );
        debug_assert!(
            !self.is_subagent || self.parent_agent_id.is_some(),
            "a subagent must record its parent"
        );
    }
}
