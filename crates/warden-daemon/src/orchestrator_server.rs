// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The HTTP server reasoner subprocesses call back into via
//! `ORCHESTRATOR_URL` (the env var set in the spawn protocol's environment
//! overlay) to list their filtered tool catalog and invoke tools, including
//! the `spawn_subagent` capability.
//!
//! Per §9's design note on cyclic references, the Agent Supervisor never
//! imports the Tool Router and the Tool Router never imports the Agent
//! Supervisor: this module is the single place both are reachable from, and
//! `spawn_subagent` is special-cased here rather than being just another
//! routed tool, because only this module has both the caller's `agent_id`
//! (authorization, per §9: "the only authorization point") and a handle to
//! the Supervisor.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use warden_core::{AgentDefinition, AgentId, OrchestratorError, ToolRoute};
use warden_router::ToolRouter;
use warden_supervisor::{AgentSupervisor, SpawnSubagentRequest, SupervisorError};

pub struct OrchestratorServerState {
    pub router: Arc<ToolRouter>,
    pub agents: Arc<AgentSupervisor>,
    pub agent_definitions: HashMap<AgentId, AgentDefinition>,
}

pub fn build_router(state: Arc<OrchestratorServerState>) -> Router {
    Router::new().route("/v1/tools", get(list_tools)).route("/v1/tools/call", post(call_tool)).with_state(state)
}

pub async fn serve(addr: SocketAddr, state: Arc<OrchestratorServerState>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state)).await
}

#[derive(Debug, Deserialize)]
struct ToolsQuery {
    agent_id: String,
}

async fn list_tools(State(state): State<Arc<OrchestratorServerState>>, Query(q): Query<ToolsQuery>) -> Json<Vec<ToolRoute>> {
    let agent_id = AgentId::new(q.agent_id);
    let (allowed, denied) = filters_for(&state, &agent_id);
    Json(state.router.filtered_tool_definitions(&allowed, &denied))
}

fn filters_for(state: &OrchestratorServerState, agent_id: &AgentId) -> (Vec<String>, Vec<String>) {
    state
        .agent_definitions
        .get(agent_id)
        .map(|d| (d.allowed_tools.clone(), d.denied_tools.clone()))
        .unwrap_or_default()
}

fn is_allowed(allowed: &[String], denied: &[String], exposed_name: &str) -> bool {
    let matches = |patterns: &[String]| patterns.iter().any(|p| glob::Pattern::new(p).map(|pat| pat.matches(exposed_name)).unwrap_or(false));
    if matches(denied) {
        return false;
    }
    allowed.is_empty() || matches(allowed)
}

#[derive(Debug, Deserialize)]
struct CallToolRequest {
    agent_id: String,
    tool_name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct CallToolResponse {
    success: bool,
    content: Option<serde_json::Value>,
    error: Option<String>,
    subagent_id: Option<String>,
}

impl CallToolResponse {
    fn ok(content: Option<serde_json::Value>) -> Self {
        Self { success: true, content, error: None, subagent_id: None }
    }

    fn err(error: impl Into<String>) -> Self {
        Self { success: false, content: None, error: Some(error.into()), subagent_id: None }
    }

    fn subagent(subagent_id: AgentId, response: serde_json::Value) -> Self {
        Self { success: true, content: Some(response), error: None, subagent_id: Some(subagent_id.to_string()) }
    }
}

#[derive(Debug, Deserialize)]
struct SpawnSubagentArgs {
    task: String,
    #[serde(default)]
    allowed_tools: Option<Vec<String>>,
    #[serde(default)]
    denied_tools: Vec<String>,
    #[serde(default)]
    timeout_minutes: Option<u32>,
    #[serde(default)]
    model: Option<String>,
}

/// `POST /v1/tools/call`: the only path through which a reasoner reaches
/// either the Tool Router or the `spawn_subagent` capability. `agent_id`
/// MUST be present (it is the sole authorization point for subagent
/// spawning per §9); its absence or mismatch is `InvalidArgument`, never
/// silently defaulted.
async fn call_tool(State(state): State<Arc<OrchestratorServerState>>, Json(req): Json<CallToolRequest>) -> Response {
    if req.agent_id.trim().is_empty() {
        return as_response(CallToolResponse::err(OrchestratorError::InvalidArgument { message: "agent_id is required".into() }.to_string()));
    }
    let caller = AgentId::new(req.agent_id);

    let (allowed, denied) = filters_for(&state, &caller);
    if !is_allowed(&allowed, &denied, &req.tool_name) {
        return as_response(CallToolResponse::err(OrchestratorError::ToolBlocked { exposed_name: req.tool_name.clone() }.to_string()));
    }

    if req.tool_name == "spawn_subagent" {
        return spawn_subagent(&state, &caller, req.arguments).await;
    }

    match state.router.route(&req.tool_name, req.arguments).await {
        Ok(outcome) if outcome.success => as_response(CallToolResponse::ok(outcome.content)),
        Ok(outcome) => as_response(CallToolResponse::err(outcome.error.unwrap_or_else(|| "tool call failed".into()))),
        Err(e) => as_response(CallToolResponse::err(e.to_string())),
    }
}

async fn spawn_subagent(state: &OrchestratorServerState, caller: &AgentId, arguments: serde_json::Value) -> Response {
    let args: SpawnSubagentArgs = match serde_json::from_value(arguments) {
        Ok(a) => a,
        Err(e) => {
            return as_response(CallToolResponse::err(
                OrchestratorError::InvalidArgument { message: format!("bad spawn_subagent arguments: {e}") }.to_string(),
            ))
        }
    };

    let request = SpawnSubagentRequest {
        task: args.task,
        allowed_tools: args.allowed_tools,
        denied_tools: args.denied_tools,
        timeout_minutes: args.timeout_minutes,
        model: args.model,
    };

    match state.agents.spawn_subagent(caller, request).await {
        Ok(outcome) => as_response(CallToolResponse::subagent(outcome.subagent_id, serde_json::json!({}))),
        Err(e) => as_response(CallToolResponse::err(supervisor_error_message(&e))),
    }
}

fn supervisor_error_message(e: &SupervisorError) -> String {
    match e {
        SupervisorError::CapacityExceeded(parent) => OrchestratorError::CapacityExceeded { what: format!("subagent slots for {parent}") }.to_string(),
        SupervisorError::NotFound(id) => OrchestratorError::AgentUnavailable { agent_id: id.clone() }.to_string(),
        SupervisorError::Unavailable(id) => OrchestratorError::AgentUnavailable { agent_id: id.clone() }.to_string(),
        SupervisorError::ParentIsSubagent(id) => OrchestratorError::InvalidArgument { message: format!("{id} is itself a subagent") }.to_string(),
        SupervisorError::SpawnFailed(detail) => detail.clone(),
    }
}

fn as_response(body: CallToolResponse) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use warden_core::AgentId;

    fn agent_def(id: &str, allowed: Vec<&str>, denied: Vec<&str>) -> AgentDefinition {
        AgentDefinition {
            agent_id: AgentId::new(id),
            enabled: true,
            desired_port: 0,
            llm_provider: "anthropic".into(),
            model: "claude".into(),
            system_prompt: None,
            allowed_tools: allowed.into_iter().map(String::from).collect(),
            denied_tools: denied.into_iter().map(String::from).collect(),
            max_steps: 10,
            idle_timeout_minutes: 10,
            cost_controls: None,
            command: "false".into(),
            args: vec![],
        }
    }

    fn state_with(defs: Vec<AgentDefinition>) -> Arc<OrchestratorServerState> {
        let mut agent_definitions = HashMap::new();
        for d in defs {
            agent_definitions.insert(d.agent_id.clone(), d);
        }
        Arc::new(OrchestratorServerState {
            router: Arc::new(ToolRouter::new()),
            agents: Arc::new(AgentSupervisor::new(std::env::temp_dir(), "http://127.0.0.1:0")),
            agent_definitions,
        })
    }

    #[tokio::test]
    async fn call_without_agent_id_is_invalid_argument() {
        let state = state_with(vec![]);
        let router = build_router(state);
        let body = serde_json::json!({ "agent_id": "", "tool_name": "fs_read", "arguments": {} });
        let response = router
            .oneshot(Request::builder().method("POST").uri("/v1/tools/call").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: CallToolResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!parsed.success);
        assert!(parsed.error.unwrap().contains("agent_id"));
    }

    #[tokio::test]
    async fn denied_tool_is_blocked_before_reaching_the_router() {
        let state = state_with(vec![agent_def("a1", vec![], vec!["fs_delete_all"])]);
        let router = build_router(state);
        let body = serde_json::json!({ "agent_id": "a1", "tool_name": "fs_delete_all", "arguments": {} });
        let response = router
            .oneshot(Request::builder().method("POST").uri("/v1/tools/call").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: CallToolResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!parsed.success);
        assert!(parsed.error.unwrap().contains("blocked"));
    }

    #[tokio::test]
    async fn spawn_subagent_fails_fast_when_parent_not_running() {
        let state = state_with(vec![agent_def("parent", vec![], vec![])]);
        let router = build_router(state);
        let body = serde_json::json!({ "agent_id": "parent", "tool_name": "spawn_subagent", "arguments": { "task": "x" } });
        let response = router
            .oneshot(Request::builder().method("POST").uri("/v1/tools/call").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: CallToolResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!parsed.success);
    }

    #[tokio::test]
    async fn list_tools_applies_agent_filter() {
        let client = Arc::new(warden_adapters::FakeToolServerClient::new(vec![warden_core::ToolDescriptor {
            name: "read".into(),
            input_schema: serde_json::json!({}),
            destructive_hint: false,
            open_world_hint: false,
        }]));
        let router = ToolRouter::new();
        router.register_server("fs", client, false);
        router.discover().await;

        let mut agent_definitions = HashMap::new();
        agent_definitions.insert(AgentId::new("a1"), agent_def("a1", vec!["mem_*"], vec![]));
        let state = Arc::new(OrchestratorServerState {
            router: Arc::new(router),
            agents: Arc::new(AgentSupervisor::new(std::env::temp_dir(), "http://127.0.0.1:0")),
            agent_definitions,
        });
        let app = build_router(state);
        let response = app.oneshot(Request::builder().uri("/v1/tools?agent_id=a1").body(Body::empty()).unwrap()).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let tools: Vec<ToolRoute> = serde_json::from_slice(&bytes).unwrap();
        assert!(tools.is_empty(), "fs_read should be filtered out by a1's allow-list");
    }
}
