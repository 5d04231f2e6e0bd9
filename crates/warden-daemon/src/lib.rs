// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `wardend`: wires every component (Tool-Server Supervisor, Tool Router,
//! Agent Supervisor, Channel Manager, Dispatch Pipeline, Scheduler, Halt
//! Manager) together behind the control-socket listener.

pub mod config;
pub mod env;
pub mod lifecycle;
pub mod listener;
pub mod orchestrator_server;
pub mod persistence;
pub mod protocol;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Notify;
use warden_adapters::channel::ChannelAdapter;
use warden_core::{AgentId, HaltState};
use warden_engine::{ChannelManager, DispatchContext, DispatchPipeline, MessageRouter, Scheduler, SchedulerContext, DEFAULT_MAX_MESSAGES_PER_CYCLE, DEFAULT_POLL_INTERVAL};
use warden_router::ToolRouter;
use warden_supervisor::{AgentSupervisor, ToolServerSupervisor};

use config::Config;
use lifecycle::LifecycleError;
use listener::{ListenCtx, Listener};
use orchestrator_server::OrchestratorServerState;

pub const HEALTH_TASK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
pub const IDLE_TASK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("persistence error: {0}")]
    Persistence(#[from] persistence::PersistenceError),
}

/// Everything the daemon owns once assembled. Background timer tasks are
/// spawned by [`Daemon::run`], not at construction time, so tests can build
/// a `Daemon` and drive individual components directly.
pub struct Daemon {
    pub config: Config,
    pub router: Arc<ToolRouter>,
    pub tool_servers: Arc<ToolServerSupervisor>,
    pub agents: Arc<AgentSupervisor>,
    pub message_router: Arc<MessageRouter>,
    pub scheduler: Arc<Scheduler>,
    pub channel_manager: Arc<ChannelManager>,
    pub halt: Arc<HaltState>,
    pub dispatch: Arc<DispatchPipeline>,
    pub agent_ids: Vec<AgentId>,
    pub orchestrator_state: Arc<OrchestratorServerState>,
    pub started_at: chrono::DateTime<Utc>,
    shutdown: Arc<Notify>,
}

impl Daemon {
    /// Builds every component and registers agents/tool servers/bindings
    /// from config, but starts no background tasks and binds no socket.
    pub async fn build(config: Config) -> Result<Self, DaemonError> {
        let router = Arc::new(ToolRouter::new());
        let tool_servers = Arc::new(ToolServerSupervisor::new());
        let spec_errors = tool_servers.start_all(config.tool_servers.clone(), &router).await;
        for err in &spec_errors {
            tracing::warn!(error = %err, "tool server failed to start");
        }
        router.discover().await;

        let agents = Arc::new(AgentSupervisor::new(config.state_dir.clone(), config.orchestrator_url.clone()));
        let mut agent_definitions = HashMap::new();
        let mut agent_ids = Vec::new();
        for definition in &config.agents {
            agent_ids.push(definition.agent_id.clone());
            agent_definitions.insert(definition.agent_id.clone(), definition.clone());
            agents.register(definition.clone()).await;
        }

        let message_router = Arc::new(MessageRouter::new(config.default_agent_id.clone()));
        let bindings = match persistence::load_bindings(&config.bindings_path) {
            Ok(bindings) if !bindings.is_empty() => bindings,
            _ => config.bindings.clone(),
        };
        message_router.update_bindings(bindings);

        let halt = Arc::new(HaltState::new());

        let channels: RwLock<HashMap<String, Arc<dyn ChannelAdapter>>> = RwLock::new(HashMap::new());

        let scheduler_ctx = Arc::new(SchedulerContext {
            router: router.clone(),
            agents: agents.clone(),
            halt: halt.clone(),
            default_agent_id: config.default_agent_id.clone(),
            channels: RwLock::new(HashMap::new()),
        });
        let scheduler = Arc::new(Scheduler::new(scheduler_ctx));
        scheduler.load_jobs(persistence::load_jobs(&config.jobs_path)?);
        scheduler.load_skills(persistence::load_skills(&config.skills_path)?);

        let channel_manager = Arc::new(ChannelManager::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_MESSAGES_PER_CYCLE));

        let orchestrator_state = Arc::new(OrchestratorServerState {
            router: router.clone(),
            agents: agents.clone(),
            agent_definitions: agent_definitions.clone(),
        });

        let dispatch_ctx = Arc::new(DispatchContext {
            router: router.clone(),
            agents: agents.clone(),
            message_router: message_router.clone(),
            scheduler: scheduler.clone(),
            halt: halt.clone(),
            agent_ids: agent_ids.clone(),
            agent_definitions,
            channels,
            started_at: Utc::now(),
        });
        let dispatch = Arc::new(DispatchPipeline::new(dispatch_ctx));

        Ok(Self {
            config,
            router,
            tool_servers,
            agents,
            message_router,
            scheduler,
            channel_manager,
            halt,
            dispatch,
            agent_ids,
            orchestrator_state,
            started_at: Utc::now(),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Registers a channel adapter both with the Channel Manager (for
    /// polling) and the Dispatch Pipeline (for replying). No built-in
    /// adapter ships with this crate beyond test fakes; operators wire a
    /// real one in before calling `run`.
    pub fn register_channel(&self, adapter: Arc<dyn ChannelAdapter>) {
        self.channel_manager.register(adapter.clone());
    }

    /// Signals the running `run()` loop to shut down, the same signal the
    /// control socket's `Shutdown` request sends internally. Used by
    /// `main.rs` when the process receives SIGTERM/SIGINT.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Starts the channel-poll loop, the scheduler tick loop, and the
    /// agent-supervisor health/idle timers, then binds the control socket
    /// and serves it until `Shutdown` is received or the process is
    /// signaled. Each background task's panics are caught at its own
    /// `tokio::spawn` boundary and logged rather than taking the daemon
    /// down with them.
    pub async fn run(self: Arc<Self>) -> Result<(), DaemonError> {
        let startup = lifecycle::startup(&self.config).await?;

        let on_message = {
            let dispatch = self.dispatch.clone();
            Arc::new(move |msg: warden_core::IncomingMessage| {
                let dispatch = dispatch.clone();
                Box::pin(async move { dispatch.dispatch(msg).await }) as Pin<Box<dyn Future<Output = ()> + Send>>
            })
        };
        self.channel_manager.start(on_message);

        self.spawn_scheduler_loop();
        self.spawn_health_loop();
        self.spawn_idle_loop();
        self.spawn_orchestrator_server();

        let ctx = Arc::new(ListenCtx {
            router: self.router.clone(),
            agents: self.agents.clone(),
            scheduler: self.scheduler.clone(),
            halt: self.halt.clone(),
            agent_ids: self.agent_ids.clone(),
            started_at: self.started_at,
            shutdown: self.shutdown.clone(),
        });
        let listener = Listener::new(startup.listener, ctx);
        let shutdown = self.shutdown.clone();
        tokio::select! {
            _ = listener.run() => {}
            _ = shutdown.notified() => {}
        }

        self.channel_manager.stop().await;
        self.persist().await;
        lifecycle::shutdown(&self.config);
        Ok(())
    }

    async fn persist(&self) {
        if let Err(e) = persistence::save_jobs(&self.config.jobs_path, &self.scheduler.jobs_snapshot()) {
            tracing::warn!(error = %e, "failed to persist jobs");
        }
        if let Err(e) = persistence::save_skills(&self.config.skills_path, &self.scheduler.skills_snapshot()) {
            tracing::warn!(error = %e, "failed to persist skills");
        }
    }

    fn spawn_scheduler_loop(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(warden_engine::TICK_INTERVAL);
            loop {
                interval.tick().await;
                let this = this.clone();
                let result = tokio::spawn(async move { this.scheduler.tick(Utc::now()).await }).await;
                if let Err(e) = result {
                    tracing::error!(error = %e, "scheduler tick task panicked; resuming on next tick");
                }
                this.persist().await;
            }
        });
    }

    fn spawn_health_loop(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_TASK_INTERVAL);
            loop {
                interval.tick().await;
                let agents = this.agents.clone();
                if let Err(e) = tokio::spawn(async move { agents.health_tick(std::time::Instant::now()).await }).await {
                    tracing::error!(error = %e, "health-check task panicked; resuming on next tick");
                }
            }
        });
    }

    fn spawn_idle_loop(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(IDLE_TASK_INTERVAL);
            loop {
                interval.tick().await;
                let agents = this.agents.clone();
                if let Err(e) = tokio::spawn(async move { agents.idle_scan(std::time::Instant::now()).await }).await {
                    tracing::error!(error = %e, "idle-scan task panicked; resuming on next tick");
                }
            }
        });
    }

    /// Binds the HTTP server reasoners call back into via `ORCHESTRATOR_URL`
    /// (§4.F spawn protocol, §9 capability-handle design note). Runs for the
    /// lifetime of the daemon; a bind failure is logged, not fatal, since an
    /// operator running only scheduler/channel traffic with no reasoner may
    /// never need it.
    fn spawn_orchestrator_server(self: &Arc<Self>) {
        let addr = self.config.orchestrator_bind_addr;
        let state = self.orchestrator_state.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator_server::serve(addr, state).await {
                tracing::error!(error = %e, %addr, "orchestrator callback server failed to bind");
            }
        });
    }
}
