// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-authored configuration: agent definitions, tool-server specs,
//! and channel bindings are static at startup (the one dynamic exception
//! is subagent registration, handled entirely by the Agent Supervisor).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use warden_core::{AgentDefinition, ChannelBinding};
use warden_supervisor::ToolServerSpec;

use crate::env;
use crate::lifecycle::LifecycleError;

#[derive(Debug, Clone, Deserialize)]
struct ToolServerConfigEntry {
    name: String,
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    allow_destructive_tools: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChannelBindingEntry {
    channel: String,
    chat_id_pattern: String,
    agent_id: String,
}

fn default_orchestrator_bind_addr() -> String {
    "127.0.0.1:8787".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RuntimeConfigFile {
    default_agent_id: String,
    #[serde(default)]
    orchestrator_url: String,
    #[serde(default = "default_orchestrator_bind_addr")]
    orchestrator_bind_addr: String,
    #[serde(default)]
    agents: Vec<AgentDefinition>,
    #[serde(default)]
    tool_servers: Vec<ToolServerConfigEntry>,
    #[serde(default)]
    bindings: Vec<ChannelBindingEntry>,
}

/// Daemon configuration: fixed on-disk paths under the resolved state
/// directory, plus the operator-authored runtime definitions loaded from
/// `<state>/runtime.toml`.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
    pub jobs_path: PathBuf,
    pub skills_path: PathBuf,
    pub bindings_path: PathBuf,
    pub agent_prompts_dir: PathBuf,
    pub audit_log_path: PathBuf,
    pub runtime_config_path: PathBuf,
    pub default_agent_id: warden_core::AgentId,
    pub orchestrator_url: String,
    pub orchestrator_bind_addr: std::net::SocketAddr,
    pub agents: Vec<AgentDefinition>,
    pub tool_servers: Vec<ToolServerSpec>,
    pub bindings: Vec<ChannelBinding>,
}

impl Config {
    /// Resolves the state directory and loads `runtime.toml` from it.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = env::state_dir()?;
        Self::load_from(state_dir)
    }

    /// Same as [`Config::load`] but with an explicit state directory, for
    /// tests that need an isolated one.
    pub fn load_from(state_dir: PathBuf) -> Result<Self, LifecycleError> {
        let runtime_config_path = state_dir.join("runtime.toml");
        let raw = if runtime_config_path.exists() {
            let text = std::fs::read_to_string(&runtime_config_path)?;
            toml::from_str::<RuntimeConfigFile>(&text).map_err(LifecycleError::ConfigParse)?
        } else {
            RuntimeConfigFile::default()
        };

        let tool_servers = raw
            .tool_servers
            .into_iter()
            .map(|entry| ToolServerSpec {
                name: entry.name,
                command: entry.command,
                args: entry.args,
                env: entry.env.into_iter().collect(),
                allow_destructive_tools: entry.allow_destructive_tools,
            })
            .collect();

        let bindings = raw
            .bindings
            .into_iter()
            .map(|entry| ChannelBinding {
                channel: entry.channel,
                chat_id_pattern: entry.chat_id_pattern,
                agent_id: entry.agent_id.into(),
            })
            .collect();

        let bind_addr_str = if raw.orchestrator_bind_addr.is_empty() { default_orchestrator_bind_addr() } else { raw.orchestrator_bind_addr };
        let orchestrator_bind_addr: std::net::SocketAddr = bind_addr_str.parse().map_err(|_| LifecycleError::InvalidOrchestratorAddr(bind_addr_str.clone()))?;
        let orchestrator_url = if raw.orchestrator_url.is_empty() { format!("http://{orchestrator_bind_addr}") } else { raw.orchestrator_url };

        Ok(Self {
            socket_path: state_dir.join("control.sock"),
            lock_path: state_dir.join("warden.pid"),
            log_path: state_dir.join("warden.log"),
            jobs_path: state_dir.join("jobs.json"),
            skills_path: state_dir.join("skills.json"),
            bindings_path: state_dir.join("bindings.json"),
            agent_prompts_dir: state_dir.join("agent-prompts"),
            audit_log_path: state_dir.join("scanner-audit.jsonl"),
            runtime_config_path,
            default_agent_id: raw.default_agent_id.into(),
            orchestrator_url,
            orchestrator_bind_addr,
            agents: raw.agents,
            tool_servers,
            bindings,
            state_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_empty_dir_yields_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().to_path_buf()).unwrap();
        assert!(config.agents.is_empty());
        assert!(config.tool_servers.is_empty());
        assert!(config.bindings.is_empty());
    }

    #[test]
    fn load_from_parses_runtime_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("runtime.toml"),
            r#"
default_agent_id = "assistant"

[[agents]]
agent_id = "assistant"
enabled = true
desired_port = 0
llm_provider = "anthropic"
model = "claude-sonnet-4"
allowed_tools = []
denied_tools = []
max_steps = 20
idle_timeout_minutes = 15
command = "reasoner"
args = []

[[tool_servers]]
name = "fs"
command = "fs-tool-server"
allow_destructive_tools = false

[[bindings]]
channel = "telegram"
chat_id_pattern = "*"
agent_id = "assistant"
"#,
        )
        .unwrap();

        let config = Config::load_from(dir.path().to_path_buf()).unwrap();
        assert_eq!(config.default_agent_id, *"assistant");
        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.tool_servers.len(), 1);
        assert_eq!(config.bindings.len(), 1);
        assert_eq!(config.bindings[0].chat_id_pattern, "*");
    }
}
