// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch Pipeline: the per-message decision chain run by the Channel
//! Manager's `on_message` callback — slash commands first, then routing,
//! lazy spawn, pause checks, and the reasoner round trip.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use warden_adapters::channel::ChannelAdapter;
use warden_adapters::reasoner_client::ProcessMessageRequest;
use warden_core::{AgentDefinition, AgentId, HaltState, IncomingMessage, HALT_ALL};
use warden_router::ToolRouter;
use warden_supervisor::AgentSupervisor;

use crate::message_router::MessageRouter;
use crate::scheduler::Scheduler;
use crate::slash_command::{SlashCommandContext, SlashCommandHandler};

const UNAVAILABLE_NOTICE: &str = "Sorry, that agent isn't available right now.";
const PAUSED_NOTICE: &str = "This agent is currently paused for cost control.";

/// Halt target gating the Dispatch Pipeline: distinct from the Scheduler's
/// `inngest` target, so an operator can silence channel traffic without
/// stopping jobs/skills, or vice versa.
pub const CHANNELS_HALT_TARGET: &str = "channels";

pub struct DispatchContext {
    pub router: Arc<ToolRouter>,
    pub agents: Arc<AgentSupervisor>,
    pub message_router: Arc<MessageRouter>,
    pub scheduler: Arc<Scheduler>,
    pub halt: Arc<HaltState>,
    pub agent_ids: Vec<AgentId>,
    pub agent_definitions: HashMap<AgentId, AgentDefinition>,
    pub channels: RwLock<HashMap<String, Arc<dyn ChannelAdapter>>>,
    pub started_at: DateTime<Utc>,
}

impl DispatchContext {
    fn adapter(&self, channel: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.channels.read().get(channel).cloned()
    }
}

/// Runs the Dispatch Pipeline for each message handed to it by the Channel
/// Manager. Constructed once and shared via the `on_message` closure.
pub struct DispatchPipeline {
    ctx: Arc<DispatchContext>,
    slash_handler: SlashCommandHandler,
}

impl DispatchPipeline {
    pub fn new(ctx: Arc<DispatchContext>) -> Self {
        Self { ctx, slash_handler: SlashCommandHandler::new() }
    }

    pub async fn dispatch(&self, message: IncomingMessage) {
        if self.ctx.halt.is_halted(CHANNELS_HALT_TARGET) || self.ctx.halt.is_halted(HALT_ALL) {
            tracing::debug!(channel = %message.channel, "channels halted; dropping message");
            return;
        }

        if message.text.starts_with('/') {
            let enabled_skills: Vec<warden_core::Skill> =
                self.ctx.scheduler.skills_snapshot().into_iter().filter(|s| s.enabled).collect();
            let slash_ctx = SlashCommandContext {
                router: &self.ctx.router,
                agents: &self.ctx.agents,
                agent_ids: &self.ctx.agent_ids,
                channel: &message.channel,
                chat_id: &message.chat_id,
                started_at: self.ctx.started_at,
                enabled_skills: &enabled_skills,
            };
            let outcome = self.slash_handler.handle(&message.text, &slash_ctx).await;
            if outcome.handled {
                if let Some(response) = outcome.response {
                    self.send(&message.channel, &message.chat_id, &response).await;
                }
                return;
            }
        }

        let target_agent = self.ctx.message_router.resolve(&message.channel, &message.chat_id);

        let available = self.ctx.agents.ensure_running(&target_agent).await.unwrap_or(false);
        if !available {
            self.send(&message.channel, &message.chat_id, UNAVAILABLE_NOTICE).await;
            return;
        }

        let _ = self.ctx.agents.touch_activity(&target_agent).await;

        if self.ctx.agents.is_paused(&target_agent).await {
            self.send(&message.channel, &message.chat_id, PAUSED_NOTICE).await;
            return;
        }

        let client = match self.ctx.agents.reasoner_client(&target_agent).await {
            Ok(client) => client,
            Err(_) => {
                self.send(&message.channel, &message.chat_id, UNAVAILABLE_NOTICE).await;
                return;
            }
        };

        let request = ProcessMessageRequest {
            id: message.id.clone(),
            chat_id: message.chat_id.clone(),
            sender_id: message.sender_id.clone(),
            text: message.text.clone(),
            date: message.timestamp,
            agent_id: target_agent.to_string(),
        };

        match client.process_message(request).await {
            Ok(response) if response.paused => {
                let _ = self.ctx.agents.mark_paused(&target_agent, "cost control pause").await;
                let (notify_channel, notify_chat) = self.notify_target(&target_agent, &message);
                self.send(&notify_channel, &notify_chat, "This agent has been paused for cost control.").await;
            }
            Ok(response) if response.success => {
                let reply = response.response.unwrap_or_default();
                self.send(&message.channel, &message.chat_id, &reply).await;
                let _ = self
                    .ctx
                    .router
                    .route(
                        "store_conversation",
                        serde_json::json!({
                            "agent_id": target_agent.as_str(),
                            "user_text": message.text,
                            "response": reply,
                        }),
                    )
                    .await;
            }
            Ok(response) => {
                let text = short_error(response.error.as_deref().unwrap_or("the agent failed to respond"));
                self.send(&message.channel, &message.chat_id, &text).await;
            }
            Err(e) => {
                self.send(&message.channel, &message.chat_id, &short_error(&e.to_string())).await;
            }
        }
    }

    /// Falls back to the message's own channel/chat when the agent has no
    /// configured notify target (§4.I step 6 "falling back to the
    /// message's channel/chat").
    fn notify_target(&self, agent_id: &AgentId, message: &IncomingMessage) -> (String, String) {
        let costs = self.ctx.agent_definitions.get(agent_id).and_then(|d| d.cost_controls.as_ref());
        let channel = costs.and_then(|c| c.notify_channel.clone()).unwrap_or_else(|| message.channel.clone());
        let chat_id = costs.and_then(|c| c.notify_chat_id.clone()).unwrap_or_else(|| message.chat_id.clone());
        (channel, chat_id)
    }

    async fn send(&self, channel: &str, chat_id: &str, text: &str) {
        let Some(adapter) = self.ctx.adapter(channel) else {
            tracing::warn!(channel, "no adapter registered for dispatch reply");
            return;
        };
        if let Err(e) = adapter.send(chat_id, text).await {
            tracing::warn!(channel, error = %e, "failed to send dispatch reply");
        }
    }
}

/// Maps an arbitrary reasoner-side error string to a short, user-facing
/// one, per §7's `InvalidArgument`/generic-failure surfacing.
fn short_error(detail: &str) -> String {
    const MAX_LEN: usize = 160;
    if detail.chars().count() <= MAX_LEN {
        format!("Something went wrong: {detail}")
    } else {
        let truncated: String = detail.chars().take(MAX_LEN).collect();
        format!("Something went wrong: {truncated}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerContext;
    use std::collections::HashMap as StdHashMap;
    use warden_adapters::channel::FakeChannelAdapter;
    use warden_adapters::reasoner_client::ProcessMessageResponse;
    use warden_adapters::FakeReasonerClient;
    use warden_core::AgentState;

    fn definition(id: &str) -> AgentDefinition {
        AgentDefinition {
            agent_id: AgentId::new(id),
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
        }
    }

    fn incoming(channel: &str, chat_id: &str, text: &str) -> IncomingMessage {
        IncomingMessage {
            id: "m1".into(),
            channel: channel.into(),
            chat_id: chat_id.into(),
            sender_id: "u1".into(),
            text: text.into(),
            timestamp: Utc::now(),
            agent_id_hint: None,
        }
    }

    fn scheduler() -> Arc<Scheduler> {
        Arc::new(Scheduler::new(Arc::new(SchedulerContext {
            router: Arc::new(ToolRouter::new()),
            agents: Arc::new(AgentSupervisor::new(std::env::temp_dir(), "http://127.0.0.1:0")),
            halt: Arc::new(HaltState::new()),
            default_agent_id: AgentId::new("default"),
            channels: RwLock::new(StdHashMap::new()),
        })))
    }

    #[tokio::test]
    async fn slash_command_never_invokes_the_reasoner() {
        let agents = Arc::new(AgentSupervisor::new(std::env::temp_dir(), "http://127.0.0.1:0"));
        agents.register(definition("a1")).await;
        let message_router = Arc::new(MessageRouter::new(AgentId::new("a1")));
        let adapter = Arc::new(FakeChannelAdapter::new("telegram"));
        let mut channels = StdHashMap::new();
        channels.insert("telegram".to_string(), adapter.clone() as Arc<dyn ChannelAdapter>);

        let ctx = Arc::new(DispatchContext {
            router: Arc::new(ToolRouter::new()),
            agents,
            message_router,
            scheduler: scheduler(),
            halt: Arc::new(HaltState::new()),
            agent_ids: vec![AgentId::new("a1")],
            agent_definitions: HashMap::new(),
            channels: RwLock::new(channels),
            started_at: Utc::now(),
        });
        let pipeline = DispatchPipeline::new(ctx.clone());

        pipeline.dispatch(incoming("telegram", "c1", "/help")).await;

        let sent = adapter.sent_messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("/status"));
        // the agent was never spawned because the reasoner path wasn't taken
        assert_eq!(ctx.agents.state_of(&AgentId::new("a1")).await.unwrap().0, AgentState::Stopped);
    }

    #[tokio::test]
    async fn unresolvable_agent_sends_unavailable_notice() {
        let agents = Arc::new(AgentSupervisor::new(std::env::temp_dir(), "http://127.0.0.1:0"));
        agents.register(definition("a1")).await;
        let message_router = Arc::new(MessageRouter::new(AgentId::new("a1")));
        let adapter = Arc::new(FakeChannelAdapter::new("telegram"));
        let mut channels = StdHashMap::new();
        channels.insert("telegram".to_string(), adapter.clone() as Arc<dyn ChannelAdapter>);

        let ctx = Arc::new(DispatchContext {
            router: Arc::new(ToolRouter::new()),
            agents,
            message_router,
            scheduler: scheduler(),
            halt: Arc::new(HaltState::new()),
            agent_ids: vec![AgentId::new("a1")],
            agent_definitions: HashMap::new(),
            channels: RwLock::new(channels),
            started_at: Utc::now(),
        });
        let pipeline = DispatchPipeline::new(ctx);

        // a1's command is "false", so ensure_running will fail to spawn.
        pipeline.dispatch(incoming("telegram", "c1", "hello")).await;

        let sent = adapter.sent_messages();
        assert_eq!(sent, vec![("c1".to_string(), UNAVAILABLE_NOTICE.to_string())]);
    }

    struct ReachableFixture {
        ctx: Arc<DispatchContext>,
        reasoner: Arc<FakeReasonerClient>,
        adapter: Arc<FakeChannelAdapter>,
    }

    async fn reachable_fixture() -> ReachableFixture {
        let agents = Arc::new(AgentSupervisor::new(std::env::temp_dir(), "http://127.0.0.1:0"));
        agents.register(definition("a1")).await;
        // force the agent into a running, available state with a fake
        // client without going through the real spawn protocol.
        agents.test_force_running(&AgentId::new("a1")).await;
        let reasoner = agents.test_install_client(&AgentId::new("a1")).await;

        let message_router = Arc::new(MessageRouter::new(AgentId::new("a1")));
        let adapter = Arc::new(FakeChannelAdapter::new("telegram"));
        let mut channels = StdHashMap::new();
        channels.insert("telegram".to_string(), adapter.clone() as Arc<dyn ChannelAdapter>);

        let ctx = Arc::new(DispatchContext {
            router: Arc::new(ToolRouter::new()),
            agents,
            message_router,
            scheduler: scheduler(),
            halt: Arc::new(HaltState::new()),
            agent_ids: vec![AgentId::new("a1")],
            agent_definitions: HashMap::new(),
            channels: RwLock::new(channels),
            started_at: Utc::now(),
        });
        ReachableFixture { ctx, reasoner, adapter }
    }

    #[tokio::test]
    async fn success_path_relays_response() {
        let fx = reachable_fixture().await;
        fx.reasoner.set_next_response(ProcessMessageResponse {
            success: true,
            response: Some("hi there".into()),
            tools_used: vec![],
            total_steps: 1,
            error: None,
            paused: false,
        });
        let pipeline = DispatchPipeline::new(fx.ctx);
        pipeline.dispatch(incoming("telegram", "c1", "hello")).await;
        assert_eq!(fx.adapter.sent_messages(), vec![("c1".to_string(), "hi there".to_string())]);
    }

    #[tokio::test]
    async fn already_paused_agent_short_circuits_before_calling_the_reasoner() {
        let fx = reachable_fixture().await;
        fx.ctx.agents.mark_paused(&AgentId::new("a1"), "over budget").await.unwrap();
        let pipeline = DispatchPipeline::new(fx.ctx);
        pipeline.dispatch(incoming("telegram", "c1", "hello")).await;
        assert_eq!(fx.adapter.sent_messages(), vec![("c1".to_string(), PAUSED_NOTICE.to_string())]);
        assert!(fx.reasoner.received_messages.lock().is_empty());
    }

    #[tokio::test]
    async fn paused_response_marks_agent_paused() {
        let fx = reachable_fixture().await;
        fx.reasoner.set_next_response(ProcessMessageResponse {
            success: false,
            response: None,
            tools_used: vec![],
            total_steps: 0,
            error: None,
            paused: true,
        });
        let pipeline = DispatchPipeline::new(fx.ctx.clone());
        pipeline.dispatch(incoming("telegram", "c1", "hello")).await;
        assert!(fx.ctx.agents.is_paused(&AgentId::new("a1")).await);
        assert_eq!(fx.adapter.sent_messages().len(), 1);
    }
}
