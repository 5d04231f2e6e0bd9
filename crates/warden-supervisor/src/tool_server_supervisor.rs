// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool-Server Supervisor (§4.F.1): eager spawn at startup, the same
//! health/restart cadence as reasoners, and route refresh on recovery.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use warden_adapters::{RpcClient, ToolServerClient};
use warden_router::ToolRouter;

pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const MAX_RESTART_ATTEMPTS: u32 = 5;
pub const RESTART_BASE_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ToolServerError {
    #[error("unknown tool server: {0}")]
    NotFound(String),
    #[error("failed to spawn tool server {0}: {1}")]
    Spawn(String, String),
}

#[derive(Debug, Clone)]
pub struct ToolServerSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub allow_destructive_tools: bool,
}

struct ServerState {
    spec: ToolServerSpec,
    client: Arc<RpcClient>,
    restart_count: u32,
    healthy: bool,
}

/// Owns the one `RpcClient` per configured tool server and keeps it alive.
/// Unlike the Agent Supervisor, every configured server is spawned eagerly
/// at startup rather than lazily on first use (§4.F.1).
pub struct ToolServerSupervisor {
    servers: AsyncMutex<HashMap<String, ServerState>>,
}

impl Default for ToolServerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolServerSupervisor {
    pub fn new() -> Self {
        Self { servers: AsyncMutex::new(HashMap::new()) }
    }

    /// Spawns every configured tool server and registers its `RpcClient`
    /// with `router`, so the caller can immediately run `router.discover()`.
    pub async fn start_all(&self, specs: Vec<ToolServerSpec>, router: &ToolRouter) -> Vec<ToolServerError> {
        let mut errors = Vec::new();
        let mut servers = self.servers.lock().await;
        for spec in specs {
            let client = Arc::new(RpcClient::new(spec.name.clone(), spec.command.clone(), spec.args.clone(), spec.env.clone(), None));
            match client.start().await {
                Ok(()) => {
                    router.register_server(spec.name.clone(), client.clone(), spec.allow_destructive_tools);
                    servers.insert(spec.name.clone(), ServerState { spec, client, restart_count: 0, healthy: true });
                }
                Err(e) => errors.push(ToolServerError::Spawn(spec.name.clone(), e.to_string())),
            }
        }
        errors
    }

    pub async fn is_healthy(&self, name: &str) -> Result<bool, ToolServerError> {
        let servers = self.servers.lock().await;
        let state = servers.get(name).ok_or_else(|| ToolServerError::NotFound(name.to_string()))?;
        Ok(state.healthy)
    }

    /// One health/restart pass over every registered server. On a
    /// successful restart, calls `router.refresh_server` so stale routes
    /// don't linger pointed at a dead process (§4.C.1b).
    pub async fn health_tick(&self, router: &ToolRouter) -> Vec<String> {
        let names: Vec<String> = self.servers.lock().await.keys().cloned().collect();
        let mut restarted = Vec::new();

        for name in names {
            let client = { self.servers.lock().await.get(&name).map(|s| s.client.clone()) };
            let Some(client) = client else { continue };

            let healthy = client.health_check().await.unwrap_or(false);
            if healthy {
                if let Some(state) = self.servers.lock().await.get_mut(&name) {
                    state.healthy = true;
                    state.restart_count = 0;
                }
                continue;
            }

            let (restart_count, spec) = {
                let mut servers = self.servers.lock().await;
                let Some(state) = servers.get_mut(&name) else { continue };
                state.healthy = false;
                state.restart_count += 1;
                (state.restart_count, state.spec.clone())
            };

            if restart_count > MAX_RESTART_ATTEMPTS {
                continue;
            }

            let backoff = RESTART_BASE_BACKOFF * 2u32.pow(restart_count.saturating_sub(1).min(8));
            tokio::time::sleep(backoff.min(Duration::from_secs(300))).await;

            let new_client = Arc::new(RpcClient::new(spec.name.clone(), spec.command.clone(), spec.args.clone(), spec.env.clone(), None));
            if new_client.start().await.is_ok() {
                if let Ok(tools) = new_client.list_tools().await {
                    router.refresh_server(&name, tools);
                }
                let mut servers = self.servers.lock().await;
                if let Some(state) = servers.get_mut(&name) {
                    state.client = new_client;
                    state.healthy = true;
                    state.restart_count = 0;
                }
                restarted.push(name);
            }
        }

        restarted
    }

    pub async fn stop_all(&self) {
        let names: Vec<String> = self.servers.lock().await.keys().cloned().collect();
        for name in names {
            if let Some(state) = self.servers.lock().await.get(&name) {
                let _ = state.client.stop().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, command: &str) -> ToolServerSpec {
        ToolServerSpec { name: name.to_string(), command: command.to_string(), args: vec![], env: vec![], allow_destructive_tools: false }
    }

    #[tokio::test]
    async fn start_all_reports_spawn_failures_without_panicking() {
        let supervisor = ToolServerSupervisor::new();
        let router = ToolRouter::new();
        let errors = supervisor.start_all(vec![spec("missing", "this-command-does-not-exist-anywhere")], &router).await;
        assert!(!errors.is_empty());
    }

    #[tokio::test]
    async fn is_healthy_on_unknown_server_errors() {
        let supervisor = ToolServerSupervisor::new();
        let result = supervisor.is_healthy("nope").await;
        assert!(matches!(result, Err(ToolServerError::NotFound(_))));
    }
}
