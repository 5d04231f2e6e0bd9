// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-socket listener: accepts `wardenctl` connections and answers
//! each with exactly one `Response`, spawning a task per connection so a
//! slow or stuck client never blocks the next one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use warden_core::{AgentId, HaltState, HALT_ALL};
use warden_engine::{Scheduler, CHANNELS_HALT_TARGET, HALT_TARGET};
use warden_router::ToolRouter;
use warden_supervisor::AgentSupervisor;

use crate::protocol::{self, AgentSummary, ProtocolError, Request, Response, StatusReport, DEFAULT_TIMEOUT};

pub struct ListenCtx {
    pub router: Arc<ToolRouter>,
    pub agents: Arc<AgentSupervisor>,
    pub scheduler: Arc<Scheduler>,
    pub halt: Arc<HaltState>,
    pub agent_ids: Vec<AgentId>,
    pub started_at: DateTime<Utc>,
    pub shutdown: Arc<Notify>,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub struct Listener {
    socket: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(socket: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { socket, ctx }
    }

    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            match e {
                                ConnectionError::Protocol(ProtocolError::ConnectionClosed) => debug!("client disconnected"),
                                ConnectionError::Protocol(ProtocolError::Timeout) => warn!("connection timed out"),
                                _ => error!(error = %e, "connection error"),
                            }
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept error"),
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: &ListenCtx) -> Result<(), ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();
    let request = protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await?;
    info!(request = ?request, "received control request");
    let response = handle_request(request, ctx).await;
    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await?;
    Ok(())
}

async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::Status => Response::Status(build_status_report(ctx).await),
        Request::Halt { target } => {
            ctx.halt.halt(target);
            Response::Ok
        }
        Request::Resume { target } => {
            ctx.halt.resume(&target);
            Response::Ok
        }
        Request::Agents => Response::AgentList(agent_summaries(ctx).await),
        Request::Tools => Response::ToolList(ctx.router.tool_definitions()),
        Request::Skills => Response::SkillList(ctx.scheduler.skills_snapshot()),
        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Response::Ok
        }
    }
}

async fn agent_summaries(ctx: &ListenCtx) -> Vec<AgentSummary> {
    let mut summaries = Vec::with_capacity(ctx.agent_ids.len());
    for agent_id in &ctx.agent_ids {
        let Some((state, available, restart_count)) = ctx.agents.state_of(agent_id).await else { continue };
        let paused = ctx.agents.is_paused(agent_id).await;
        summaries.push(AgentSummary { agent_id: agent_id.to_string(), state, available, restart_count, paused, is_subagent: false });
    }
    summaries
}

async fn build_status_report(ctx: &ListenCtx) -> StatusReport {
    let agents = agent_summaries(ctx).await;
    let uptime_seconds = Utc::now().signed_duration_since(ctx.started_at).num_seconds().max(0) as u64;
    let halted_targets: Vec<String> =
        [HALT_TARGET, CHANNELS_HALT_TARGET, HALT_ALL].into_iter().filter(|t| ctx.halt.is_halted(t)).map(str::to_string).collect();

    StatusReport {
        uptime_seconds,
        agents,
        tool_count: ctx.router.tool_definitions().len(),
        blocked_tool_count: ctx.router.get_blocked_tools().len(),
        halted_targets,
        jobs_loaded: ctx.scheduler.jobs_snapshot().len(),
        skills_loaded: ctx.scheduler.skills_snapshot().len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::AgentDefinition;
    use warden_engine::SchedulerContext;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    async fn ctx_with_one_agent() -> Arc<ListenCtx> {
        let router = Arc::new(ToolRouter::new());
        let agents = Arc::new(AgentSupervisor::new(std::env::temp_dir(), "http://127.0.0.1:0"));
        agents
            .register(AgentDefinition {
                agent_id: AgentId::new("a1"),
                enabled: true,
                desired_port: 0,
                llm_provider: "anthropic".into(),
                model: "claude".into(),
                system_prompt: None,
                allowed_tools: vec![],
                denied_tools: vec![],
                max_steps: 10,
                idle_timeout_minutes: 10,
                cost_controls: None,
                command: "false".into(),
                args: vec![],
            })
            .await;
        let halt = Arc::new(HaltState::new());
        let scheduler = Arc::new(Scheduler::new(Arc::new(SchedulerContext {
            router: router.clone(),
            agents: agents.clone(),
            halt: halt.clone(),
            default_agent_id: AgentId::new("a1"),
            channels: RwLock::new(HashMap::new()),
        })));
        Arc::new(ListenCtx {
            router,
            agents,
            scheduler,
            halt,
            agent_ids: vec![AgentId::new("a1")],
            started_at: Utc::now(),
            shutdown: Arc::new(Notify::new()),
        })
    }

    #[tokio::test]
    async fn ping_responds_with_pong() {
        let ctx = ctx_with_one_agent().await;
        assert!(matches!(handle_request(Request::Ping, &ctx).await, Response::Pong));
    }

    #[tokio::test]
    async fn halt_then_status_reports_halted_target() {
        let ctx = ctx_with_one_agent().await;
        handle_request(Request::Halt { target: "inngest".into() }, &ctx).await;
        let Response::Status(report) = handle_request(Request::Status, &ctx).await else { panic!("expected Status") };
        assert!(report.halted_targets.contains(&"inngest".to_string()));
    }

    #[tokio::test]
    async fn resume_clears_halted_target() {
        let ctx = ctx_with_one_agent().await;
        handle_request(Request::Halt { target: "inngest".into() }, &ctx).await;
        handle_request(Request::Resume { target: "inngest".into() }, &ctx).await;
        let Response::Status(report) = handle_request(Request::Status, &ctx).await else { panic!("expected Status") };
        assert!(!report.halted_targets.contains(&"inngest".to_string()));
    }

    #[tokio::test]
    async fn agents_lists_registered_agent_as_stopped() {
        let ctx = ctx_with_one_agent().await;
        let Response::AgentList(agents) = handle_request(Request::Agents, &ctx).await else { panic!("expected AgentList") };
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].agent_id, "a1");
        assert!(!agents[0].available);
    }

    #[tokio::test]
    async fn shutdown_notifies_the_shutdown_signal() {
        let ctx = ctx_with_one_agent().await;
        let notified = ctx.shutdown.notified();
        handle_request(Request::Shutdown, &ctx).await;
        tokio::time::timeout(std::time::Duration::from_secs(1), notified).await.unwrap();
    }
}
