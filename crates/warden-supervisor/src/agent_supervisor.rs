// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent Supervisor (§4.F): lazy spawn, health/idle/restart timers, and
//! single-level subagent lifecycle with cascade cleanup.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::process::Child;
use tokio::sync::Mutex as AsyncMutex;
use warden_adapters::subprocess::stop_gracefully;
use warden_adapters::ReasonerClient;
use warden_core::{AgentDefinition, AgentId, AgentState, ManagedAgent};

use crate::spawn::{self, SpawnError};

pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const IDLE_SCAN_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const RESTART_BASE_BACKOFF: Duration = Duration::from_secs(10);
pub const MAX_RESTART_ATTEMPTS: u32 = 5;
pub const MAX_SUBAGENTS_PER_PARENT: usize = 5;
pub const DEFAULT_SUBAGENT_TIMEOUT_MINUTES: u32 = 5;
pub const MAX_SUBAGENT_TIMEOUT_MINUTES: u32 = 30;

#[derive(Debug, Error, Clone)]
pub enum SupervisorError {
    #[error("agent not found: {0}")]
    NotFound(String),
    #[error("agent unavailable: {0}")]
    Unavailable(String),
    #[error("parent agent {0} is itself a subagent")]
    ParentIsSubagent(String),
    #[error("subagent capacity exceeded for parent {0}")]
    CapacityExceeded(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
}

impl From<SpawnError> for SupervisorError {
    fn from(e: SpawnError) -> Self {
        SupervisorError::SpawnFailed(e.to_string())
    }
}

/// The outcome of a single in-flight spawn attempt, shared by every caller
/// that observes `state == starting` while it's running rather than each
/// starting their own (§4.F "Ensure-running deduplication").
type SharedSpawn = Shared<BoxFuture<'static, Result<bool, SupervisorError>>>;

struct AgentEntry {
    managed: ManagedAgent,
    child: Option<Child>,
    client: Option<Arc<dyn ReasonerClient>>,
    spawn_future: Option<SharedSpawn>,
}

pub struct SpawnSubagentRequest {
    pub task: String,
    pub allowed_tools: Option<Vec<String>>,
    pub denied_tools: Vec<String>,
    pub timeout_minutes: Option<u32>,
    pub model: Option<String>,
}

pub struct SpawnSubagentOutcome {
    pub subagent_id: AgentId,
    pub client: Arc<dyn ReasonerClient>,
}

/// Owns every agent's runtime state. Each agent's entry is guarded by its
/// own async mutex so `EnsureRunning` callers serialize on exactly the
/// agent they're contending for; while a spawn is in flight the attempt's
/// future is shared, so every concurrent caller — whether the spawn
/// ultimately succeeds or fails — observes that single attempt's outcome
/// instead of running its own.
pub struct AgentSupervisor {
    agents: tokio::sync::RwLock<HashMap<AgentId, Arc<AsyncMutex<AgentEntry>>>>,
    subagents_by_parent: parking_lot::Mutex<HashMap<AgentId, HashSet<AgentId>>>,
    state_dir: PathBuf,
    orchestrator_url: String,
}

impl AgentSupervisor {
    pub fn new(state_dir: PathBuf, orchestrator_url: impl Into<String>) -> Self {
        Self {
            agents: tokio::sync::RwLock::new(HashMap::new()),
            subagents_by_parent: parking_lot::Mutex::new(HashMap::new()),
            state_dir,
            orchestrator_url: orchestrator_url.into(),
        }
    }

    pub async fn register(&self, definition: AgentDefinition) {
        let agent_id = definition.agent_id.clone();
        let entry = AgentEntry { managed: ManagedAgent::new(definition, Instant::now()), child: None, client: None, spawn_future: None };
        self.agents.write().await.insert(agent_id, Arc::new(AsyncMutex::new(entry)));
    }

    async fn entry(&self, agent_id: &AgentId) -> Result<Arc<AsyncMutex<AgentEntry>>, SupervisorError> {
        self.agents.read().await.get(agent_id).cloned().ok_or_else(|| SupervisorError::NotFound(agent_id.to_string()))
    }

    pub async fn state_of(&self, agent_id: &AgentId) -> Option<(AgentState, bool, u32)> {
        let entry = self.agents.read().await.get(agent_id)?.clone();
        let guard = entry.lock().await;
        Some((guard.managed.state, guard.managed.available, guard.managed.restart_count))
    }

    /// §4.F "Ensure-running deduplication": returns whether the agent is
    /// available, spawning it if necessary. Exactly one spawn protocol runs
    /// per batch of concurrent callers (§8 property 2) — whichever caller
    /// finds the agent not already `starting` installs a shared future that
    /// runs the spawn and publishes its outcome; everyone else, success or
    /// failure, awaits that same future instead of spawning their own.
    pub async fn ensure_running(&self, agent_id: &AgentId) -> Result<bool, SupervisorError> {
        let entry = self.entry(agent_id).await?;

        let fut = {
            let mut guard = entry.lock().await;

            if guard.managed.state == AgentState::Running && guard.managed.available {
                return Ok(true);
            }

            if let Some(fut) = &guard.spawn_future {
                fut.clone()
            } else {
                guard.managed.state = AgentState::Starting;
                let definition = guard.managed.definition.clone();
                let state_dir = self.state_dir.clone();
                let orchestrator_url = self.orchestrator_url.clone();
                let entry_for_task = entry.clone();

                let fut: BoxFuture<'static, Result<bool, SupervisorError>> = async move {
                    let prompt_path = spawn::materialize_prompt(&state_dir, &definition).await?;
                    match spawn::spawn_reasoner(&definition, prompt_path.clone(), &orchestrator_url).await {
                        Ok(spawned) => {
                            let mut guard = entry_for_task.lock().await;
                            guard.managed.state = AgentState::Running;
                            guard.managed.available = true;
                            guard.managed.actual_port = Some(spawned.port);
                            guard.managed.prompt_file_path = prompt_path;
                            guard.managed.pid = spawned.child.id();
                            guard.managed.last_activity_at = Instant::now();
                            guard.child = Some(spawned.child);
                            guard.client = Some(spawned.client);
                            guard.spawn_future = None;
                            Ok(true)
                        }
                        Err(_) => {
                            let mut guard = entry_for_task.lock().await;
                            guard.managed.state = AgentState::Stopped;
                            guard.managed.available = false;
                            guard.spawn_future = None;
                            Ok(false)
                        }
                    }
                }
                .boxed();
                let fut = fut.shared();
                guard.spawn_future = Some(fut.clone());
                fut
            }
        };

        fut.await
    }

    pub async fn reasoner_client(&self, agent_id: &AgentId) -> Result<Arc<dyn ReasonerClient>, SupervisorError> {
        let entry = self.entry(agent_id).await?;
        let guard = entry.lock().await;
        guard.client.clone().ok_or_else(|| SupervisorError::Unavailable(agent_id.to_string()))
    }

    pub async fn touch_activity(&self, agent_id: &AgentId) -> Result<(), SupervisorError> {
        let entry = self.entry(agent_id).await?;
        entry.lock().await.managed.last_activity_at = Instant::now();
        Ok(())
    }

    pub async fn is_paused(&self, agent_id: &AgentId) -> bool {
        let Ok(entry) = self.entry(agent_id).await else { return false };
        entry.lock().await.managed.paused
    }

    pub async fn mark_paused(&self, agent_id: &AgentId, reason: impl Into<String>) -> Result<(), SupervisorError> {
        let entry = self.entry(agent_id).await?;
        let mut guard = entry.lock().await;
        guard.managed.paused = true;
        guard.managed.pause_reason = Some(reason.into());
        Ok(())
    }

    /// Resumes only after the reasoner acknowledges via `cost_resume`.
    pub async fn resume(&self, agent_id: &AgentId, reset_window: bool) -> Result<(), SupervisorError> {
        let entry = self.entry(agent_id).await?;
        let client = { entry.lock().await.client.clone() };
        let Some(client) = client else { return Err(SupervisorError::Unavailable(agent_id.to_string())) };
        let ack = client
            .cost_resume(warden_adapters::reasoner_client::CostResumeRequest { reset_window })
            .await
            .map_err(|e| SupervisorError::Unavailable(e.to_string()))?;
        if ack.success {
            let mut guard = entry.lock().await;
            guard.managed.paused = false;
            guard.managed.pause_reason = None;
        }
        Ok(())
    }

    /// §4.F "Killing subagents" / "Cascade stop": stops the agent's own
    /// process (after first killing every subagent it owns) and, for
    /// persistent agents, leaves a `stopped` entry behind; subagents are
    /// removed entirely.
    pub async fn stop_agent(&self, agent_id: &AgentId) -> Result<(), SupervisorError> {
        let children: Vec<AgentId> = self.subagents_by_parent.lock().get(agent_id).cloned().unwrap_or_default().into_iter().collect();
        for child in children {
            self.kill_subagent(&child).await?;
        }

        let entry = self.entry(agent_id).await?;
        let mut guard = entry.lock().await;
        if let Some(mut child) = guard.child.take() {
            let _ = stop_gracefully(&mut child).await;
        }
        if let Some(path) = guard.managed.prompt_file_path.take() {
            let _ = tokio::fs::remove_file(path).await;
        }
        guard.client = None;
        guard.managed.state = AgentState::Stopped;
        guard.managed.available = false;
        guard.managed.restart_count = 0;
        guard.managed.pid = None;
        let is_subagent = guard.managed.is_subagent;
        drop(guard);

        if is_subagent {
            self.agents.write().await.remove(agent_id);
        }
        Ok(())
    }

    /// Kills and re-spawns a `running` agent's process in place, without
    /// touching `restart_count` (the caller tracks that) or cascading to
    /// subagents — unlike [`Self::stop_agent`], this is the internal
    /// recovery mechanism the health checker uses, not the user/idle/cascade
    /// stop path the `restartCount` reset invariant (§8 property 8) applies to.
    async fn force_restart(&self, agent_id: &AgentId) -> Result<bool, SupervisorError> {
        let entry = self.entry(agent_id).await?;
        {
            let mut guard = entry.lock().await;
            if let Some(mut child) = guard.child.take() {
                let _ = stop_gracefully(&mut child).await;
            }
            if let Some(path) = guard.managed.prompt_file_path.take() {
                let _ = tokio::fs::remove_file(path).await;
            }
            guard.client = None;
            guard.managed.state = AgentState::Stopped;
            guard.managed.available = false;
            guard.managed.pid = None;
        }
        self.ensure_running(agent_id).await
    }

    /// §4.F "Subagent spawning (single-level)".
    pub async fn spawn_subagent(&self, parent_id: &AgentId, request: SpawnSubagentRequest) -> Result<SpawnSubagentOutcome, SupervisorError> {
        let parent_entry = self.entry(parent_id).await?;
        let parent_definition = {
            let guard = parent_entry.lock().await;
            if guard.managed.is_subagent {
                return Err(SupervisorError::ParentIsSubagent(parent_id.to_string()));
            }
            if guard.managed.state != AgentState::Running {
                return Err(SupervisorError::Unavailable(parent_id.to_string()));
            }
            guard.managed.definition.clone()
        };

        {
            let mut map = self.subagents_by_parent.lock();
            let children = map.entry(parent_id.clone()).or_default();
            if children.len() >= MAX_SUBAGENTS_PER_PARENT {
                return Err(SupervisorError::CapacityExceeded(parent_id.to_string()));
            }
            children.insert(AgentId::new(format!("pending-{}", uuid::Uuid::new_v4())));
        }

        let subagent_id = AgentId::new(format!("sub-{}", uuid::Uuid::new_v4()));
        {
            let mut map = self.subagents_by_parent.lock();
            if let Some(children) = map.get_mut(parent_id) {
                children.retain(|c| !c.as_str().starts_with("pending-"));
                children.insert(subagent_id.clone());
            }
        }

        let definition = parent_definition.derive_subagent(
            subagent_id.clone(),
            request.task,
            request.model,
            request.allowed_tools,
            request.denied_tools,
        );

        let timeout_minutes = request.timeout_minutes.unwrap_or(DEFAULT_SUBAGENT_TIMEOUT_MINUTES).min(MAX_SUBAGENT_TIMEOUT_MINUTES);

        let mut managed = ManagedAgent::new(definition, Instant::now());
        managed.is_subagent = true;
        managed.parent_agent_id = Some(parent_id.clone());
        managed.auto_kill_deadline = Some(Instant::now() + Duration::from_secs(u64::from(timeout_minutes) * 60));

        let entry = Arc::new(AsyncMutex::new(AgentEntry { managed, child: None, client: None, spawn_future: None }));
        self.agents.write().await.insert(subagent_id.clone(), entry);

        let available = self.ensure_running(&subagent_id).await?;
        if !available {
            self.kill_subagent(&subagent_id).await?;
            return Err(SupervisorError::SpawnFailed(format!("subagent {subagent_id} failed to become healthy")));
        }

        let client = self.reasoner_client(&subagent_id).await?;
        Ok(SpawnSubagentOutcome { subagent_id, client })
    }

    pub async fn kill_subagent(&self, subagent_id: &AgentId) -> Result<(), SupervisorError> {
        let parent = {
            let entry = self.entry(subagent_id).await?;
            entry.lock().await.managed.parent_agent_id.clone()
        };
        self.stop_agent(subagent_id).await?;
        if let Some(parent) = parent {
            if let Some(children) = self.subagents_by_parent.lock().get_mut(&parent) {
                children.remove(subagent_id);
            }
        }
        Ok(())
    }

    pub fn subagent_count(&self, parent_id: &AgentId) -> usize {
        self.subagents_by_parent.lock().get(parent_id).map(HashSet::len).unwrap_or(0)
    }

    /// §4.F "Idle-kill": persistent, non-subagent agents idle past their
    /// configured timeout are stopped. Subagents are exempt — they have
    /// their own auto-kill deadline.
    pub async fn idle_scan(&self, now: std::time::Instant) -> Vec<AgentId> {
        let candidates: Vec<AgentId> = {
            let agents = self.agents.read().await;
            let mut out = Vec::new();
            for (id, entry) in agents.iter() {
                let guard = entry.lock().await;
                if guard.managed.is_subagent || guard.managed.state != AgentState::Running {
                    continue;
                }
                let idle_for = now.saturating_duration_since(guard.managed.last_activity_at);
                if idle_for > Duration::from_secs(u64::from(guard.managed.definition.idle_timeout_minutes) * 60) {
                    out.push(id.clone());
                }
            }
            out
        };
        for id in &candidates {
            let _ = self.stop_agent(id).await;
        }
        candidates
    }

    /// §4.F "Restart-with-backoff" and subagent auto-kill: call once per
    /// health tick. A restart is only initiated after two consecutive
    /// unhealthy checks (§4.F "if unhealthy twice in a row"); the backoff
    /// sleep and the restart itself run in a detached task so one agent's
    /// backoff never delays this tick's check of the others. Returns
    /// subagents that were auto-killed for exceeding their deadline; agents
    /// whose restart was *initiated* this tick (the restart itself completes
    /// asynchronously).
    pub async fn health_tick(self: &Arc<Self>, now: std::time::Instant) -> (Vec<AgentId>, Vec<AgentId>) {
        let ids: Vec<AgentId> = self.agents.read().await.keys().cloned().collect();
        let mut restart_initiated = Vec::new();
        let mut auto_killed = Vec::new();

        for id in ids {
            let Ok(entry) = self.entry(&id).await else { continue };
            let (is_subagent, deadline, state, client) = {
                let guard = entry.lock().await;
                (guard.managed.is_subagent, guard.managed.auto_kill_deadline, guard.managed.state, guard.client.clone())
            };

            if is_subagent {
                if let Some(deadline) = deadline {
                    if now >= deadline {
                        let _ = self.kill_subagent(&id).await;
                        auto_killed.push(id);
                    }
                }
                continue;
            }

            if state != AgentState::Running {
                continue;
            }

            let healthy = match &client {
                Some(client) => client.health().await,
                None => false,
            };

            if !healthy {
                let should_restart = {
                    let mut guard = entry.lock().await;
                    guard.managed.available = false;
                    guard.managed.consecutive_unhealthy += 1;
                    guard.managed.consecutive_unhealthy >= 2
                        && !guard.managed.restarting
                        && guard.managed.restart_count < MAX_RESTART_ATTEMPTS
                };
                if should_restart {
                    let attempt = {
                        let mut guard = entry.lock().await;
                        guard.managed.restarting = true;
                        guard.managed.restart_count += 1;
                        guard.managed.restart_count
                    };
                    let supervisor = self.clone();
                    let restart_id = id.clone();
                    tokio::spawn(async move {
                        let backoff = RESTART_BASE_BACKOFF * 2u32.pow(attempt.saturating_sub(1).min(8));
                        tokio::time::sleep(backoff.min(Duration::from_secs(300))).await;
                        let restarted_ok = supervisor.force_restart(&restart_id).await.unwrap_or(false);
                        if let Ok(entry) = supervisor.entry(&restart_id).await {
                            let mut guard = entry.lock().await;
                            guard.managed.restarting = false;
                            if restarted_ok {
                                guard.managed.consecutive_unhealthy = 0;
                            }
                        }
                    });
                    restart_initiated.push(id);
                }
            } else {
                let mut guard = entry.lock().await;
                guard.managed.available = true;
                guard.managed.consecutive_unhealthy = 0;
            }
        }

        (restart_initiated, auto_killed)
    }
}

#[cfg(any(test, feature = "test-support"))]
impl AgentSupervisor {
    /// Forces an already-registered agent into `running`/available state
    /// without going through the spawn protocol, for tests that need a
    /// dispatchable agent without spawning a real subprocess.
    pub async fn test_force_running(&self, agent_id: &AgentId) {
        if let Ok(entry) = self.entry(agent_id).await {
            let mut guard = entry.lock().await;
            guard.managed.state = AgentState::Running;
            guard.managed.available = true;
        }
    }

    /// Installs a fake reasoner client on an already-registered agent and
    /// returns it so the caller can program responses on it.
    pub async fn test_install_client(&self, agent_id: &AgentId) -> Arc<warden_adapters::FakeReasonerClient> {
        let client = Arc::new(warden_adapters::FakeReasonerClient::new());
        if let Ok(entry) = self.entry(agent_id).await {
            entry.lock().await.client = Some(client.clone());
        }
        client
    }
}
