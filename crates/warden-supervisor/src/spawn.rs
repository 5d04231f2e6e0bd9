// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reasoner spawn protocol (§4.F, "Spawn protocol"): materializing a
//! system prompt file, building the environment overlay, launching the
//! child, and waiting for `LISTENING_PORT=<n>` plus a healthy `/health`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::time::timeout;
use warden_adapters::subprocess::{spawn_piped, HEALTH_READY_TIMEOUT, PORT_ANNOUNCE_TIMEOUT};
use warden_adapters::{HttpReasonerClient, ReasonerClient};
use warden_core::AgentDefinition;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to spawn reasoner: {0}")]
    Spawn(String),
    #[error("timed out waiting for LISTENING_PORT announcement")]
    PortAnnounceTimeout,
    #[error("timed out waiting for reasoner to become healthy")]
    HealthTimeout,
    #[error("failed to write system prompt file: {0}")]
    PromptFile(String),
}

pub struct Spawned {
    pub child: Child,
    pub port: u16,
    pub client: std::sync::Arc<dyn ReasonerClient>,
    pub prompt_file_path: Option<PathBuf>,
}

/// Writes `definition.system_prompt` (if any) to `<state_dir>/agent-prompts/<agentId>.txt`.
pub async fn materialize_prompt(state_dir: &Path, definition: &AgentDefinition) -> Result<Option<PathBuf>, SpawnError> {
    let Some(prompt) = &definition.system_prompt else { return Ok(None) };
    let dir = state_dir.join("agent-prompts");
    tokio::fs::create_dir_all(&dir).await.map_err(|e| SpawnError::PromptFile(e.to_string()))?;
    let path = dir.join(format!("{}.txt", definition.agent_id));
    tokio::fs::write(&path, prompt).await.map_err(|e| SpawnError::PromptFile(e.to_string()))?;
    Ok(Some(path))
}

pub fn build_env(definition: &AgentDefinition, prompt_file_path: Option<&Path>, orchestrator_url: &str) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = std::env::vars().collect();
    env.push(("LLM_PROVIDER".to_string(), definition.llm_provider.clone()));
    env.push(("MODEL".to_string(), definition.model.clone()));
    env.push(("ORCHESTRATOR_URL".to_string(), orchestrator_url.to_string()));
    if let Some(path) = prompt_file_path {
        env.push(("SYSTEM_PROMPT_PATH".to_string(), path.display().to_string()));
    }
    if let Some(cost) = &definition.cost_controls {
        env.push(("COST_SHORT_WINDOW_MINUTES".to_string(), cost.short_window_minutes.to_string()));
        env.push(("COST_SPIKE_MULTIPLIER".to_string(), cost.spike_multiplier.to_string()));
        env.push(("COST_HARD_CAP_TOKENS_PER_HOUR".to_string(), cost.hard_cap_tokens_per_hour.to_string()));
        env.push(("COST_MINIMUM_BASELINE_TOKENS".to_string(), cost.minimum_baseline_tokens.to_string()));
    }
    env
}

/// Runs steps 2-5 of the spawn protocol. Step 1 (prompt materialization) is
/// split out above since subagents reuse it with a different prompt source.
pub async fn spawn_reasoner(
    definition: &AgentDefinition,
    prompt_file_path: Option<PathBuf>,
    orchestrator_url: &str,
) -> Result<Spawned, SpawnError> {
    let env = build_env(definition, prompt_file_path.as_deref(), orchestrator_url);
    let mut child = spawn_piped(&definition.command, &definition.args, &env, None).map_err(|e| SpawnError::Spawn(e.to_string()))?;

    let port = if definition.desired_port == 0 {
        let stdout = child.stdout.take().ok_or_else(|| SpawnError::Spawn("no stdout".into()))?;
        let (port, stdout) = wait_for_port_announcement(stdout).await?;
        child.stdout = Some(stdout);
        port
    } else {
        definition.desired_port
    };

    let client: std::sync::Arc<dyn ReasonerClient> = std::sync::Arc::new(HttpReasonerClient::new(port));
    wait_for_healthy(client.as_ref()).await?;

    Ok(Spawned { child, port, client, prompt_file_path })
}

async fn wait_for_port_announcement(stdout: tokio::process::ChildStdout) -> Result<(u16, tokio::process::ChildStdout), SpawnError> {
    // We need to both consume the announcement line and hand the stream
    // back for later stderr-style debug forwarding; since tokio's ChildStdout
    // can't be "un-read", forwarding happens on a wrapped BufReader kept by
    // the caller in practice. For the purposes of this protocol step we
    // resolve the port and drop the handle — ongoing stdout lines after the
    // announcement are forwarded by the caller's own reader task.
    let result = timeout(PORT_ANNOUNCE_TIMEOUT, async move {
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line).await.map_err(|e| SpawnError::Spawn(e.to_string()))?;
            if n == 0 {
                return Err(SpawnError::PortAnnounceTimeout);
            }
            if let Some(rest) = line.trim_end().strip_prefix("LISTENING_PORT=") {
                let port: u16 = rest.parse().map_err(|_| SpawnError::PortAnnounceTimeout)?;
                return Ok((port, reader.into_inner()));
            }
        }
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_) => Err(SpawnError::PortAnnounceTimeout),
    }
}

async fn wait_for_healthy(client: &dyn ReasonerClient) -> Result<(), SpawnError> {
    let deadline = tokio::time::Instant::now() + HEALTH_READY_TIMEOUT;
    loop {
        if client.health().await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(SpawnError::HealthTimeout);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::AgentId;

    fn definition() -> AgentDefinition {
        AgentDefinition {
            agent_id: AgentId::new("a1"),
            enabled: true,
            desired_port: 9999,
            llm_provider: "anthropic".into(),
            model: "claude".into(),
            system_prompt: Some("be helpful".into()),
            allowed_tools: vec![],
            denied_tools: vec![],
            max_steps: 10,
            idle_timeout_minutes: 10,
            cost_controls: None,
            command: "true".into(),
            args: vec![],
        }
    }

    #[tokio::test]
    async fn materialize_prompt_writes_to_agent_prompts_dir() {
        let dir = tempfile::tempdir().unwrap();
        let def = definition();
        let path = materialize_prompt(dir.path(), &def).await.unwrap().unwrap();
        assert!(path.starts_with(dir.path().join("agent-prompts")));
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "be helpful");
    }

    #[tokio::test]
    async fn materialize_prompt_is_none_without_system_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let mut def = definition();
        def.system_prompt = None;
        assert!(materialize_prompt(dir.path(), &def).await.unwrap().is_none());
    }

    #[test]
    fn build_env_includes_model_and_provider() {
        let def = definition();
        let env = build_env(&def, None, "http://127.0.0.1:9000");
        assert!(env.iter().any(|(k, v)| k == "MODEL" && v == "claude"));
        assert!(env.iter().any(|(k, v)| k == "LLM_PROVIDER" && v == "anthropic"));
    }
}
