// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slash-Command Handler (§4.H): zero-LLM commands dispatched straight to
//! the Tool Router. Unknown commands fall through to the reasoner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use warden_core::{AgentId, Skill};
use warden_router::ToolRouter;
use warden_supervisor::AgentSupervisor;

pub struct SlashCommandOutcome {
    pub handled: bool,
    pub response: Option<String>,
}

impl SlashCommandOutcome {
    fn handled(response: impl Into<String>) -> Self {
        Self { handled: true, response: Some(response.into()) }
    }

    fn not_handled() -> Self {
        Self { handled: false, response: None }
    }
}

/// Minimal view the handler needs over the running system; kept narrow so
/// tests can assemble it without a full daemon.
pub struct SlashCommandContext<'a> {
    pub router: &'a ToolRouter,
    pub agents: &'a AgentSupervisor,
    pub agent_ids: &'a [AgentId],
    pub channel: &'a str,
    pub chat_id: &'a str,
    pub started_at: DateTime<Utc>,
    pub enabled_skills: &'a [Skill],
}

pub struct SlashCommandHandler;

impl Default for SlashCommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SlashCommandHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn handle(&self, text: &str, ctx: &SlashCommandContext<'_>) -> SlashCommandOutcome {
        let Some(rest) = text.strip_prefix('/') else { return SlashCommandOutcome::not_handled() };
        let (command, arg) = match rest.split_once(' ') {
            Some((command, arg)) => (command, arg.trim()),
            None => (rest, ""),
        };

        match command {
            "status" => self.status(ctx).await,
            "delete" => self.delete(arg, ctx).await,
            "info" => self.info(ctx).await,
            "help" => Self::help(),
            _ => SlashCommandOutcome::not_handled(),
        }
    }

    async fn status(&self, ctx: &SlashCommandContext<'_>) -> SlashCommandOutcome {
        let uptime = Utc::now().signed_duration_since(ctx.started_at);
        let mut lines = vec![format!("uptime: {}m", uptime.num_minutes())];

        let mut running = 0usize;
        for agent_id in ctx.agent_ids {
            if let Some((state, available, restart_count)) = ctx.agents.state_of(agent_id).await {
                lines.push(format!("agent {}: {} (available={}, restarts={})", agent_id, state, available, restart_count));
                if available {
                    running += 1;
                }
            }
        }

        let tool_count = ctx.router.tool_definitions().len();
        lines.push(format!("tools: {tool_count}"));
        lines.push(format!("active sessions: {running}/{}", ctx.agent_ids.len()));
        SlashCommandOutcome::handled(lines.join("\n"))
    }

    async fn delete(&self, arg: &str, ctx: &SlashCommandContext<'_>) -> SlashCommandOutcome {
        let plan = match parse_delete_spec(arg) {
            Some(plan) => plan,
            None => return SlashCommandOutcome::handled("usage: /delete today|<N>h|<N>"),
        };

        let list_tool = format!("{}_list_messages", ctx.channel);
        let delete_tool = format!("{}_delete_messages", ctx.channel);

        let mut collected: Vec<(String, DateTime<Utc>)> = Vec::new();
        let mut offset = 0usize;
        while collected.len() < 500 {
            let page = ctx
                .router
                .route(&list_tool, serde_json::json!({ "chat_id": ctx.chat_id, "limit": 100, "offset": offset }))
                .await;
            let Ok(outcome) = page else { break };
            let Some(content) = outcome.content else { break };
            let Some(items) = content.get("messages").and_then(|v| v.as_array()) else { break };
            if items.is_empty() {
                break;
            }
            for item in items {
                let (Some(id), Some(ts)) = (item.get("id").and_then(|v| v.as_str()), item.get("timestamp").and_then(|v| v.as_str())) else {
                    continue;
                };
                if let Ok(ts) = DateTime::parse_from_rfc3339(ts) {
                    collected.push((id.to_string(), ts.with_timezone(&Utc)));
                }
            }
            offset += 100;
            if items.len() < 100 {
                break;
            }
        }

        let filtered = plan.filter(collected);
        let total = filtered.len();

        for chunk in filtered.chunks(100) {
            let ids: Vec<&str> = chunk.iter().map(String::as_str).collect();
            let _ = ctx.router.route(&delete_tool, serde_json::json!({ "chat_id": ctx.chat_id, "message_ids": ids })).await;
        }

        SlashCommandOutcome::handled(format!("Deleted {total} message(s)"))
    }

    async fn info(&self, ctx: &SlashCommandContext<'_>) -> SlashCommandOutcome {
        let mut by_prefix: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
        for route in ctx.router.tool_definitions() {
            let prefix = route.exposed_name.split('_').next().unwrap_or(&route.exposed_name).to_string();
            *by_prefix.entry(prefix).or_insert(0) += 1;
        }

        let mut lines = vec!["commands: /status /delete /info /help".to_string()];
        for (prefix, count) in by_prefix {
            lines.push(format!("{prefix}: {count} tool(s)"));
        }
        lines.push("enabled skills:".to_string());
        for skill in ctx.enabled_skills {
            lines.push(format!("  - {}", skill.name));
        }
        SlashCommandOutcome::handled(lines.join("\n"))
    }

    fn help() -> SlashCommandOutcome {
        SlashCommandOutcome::handled(
            "/status - system status\n/delete <today|Nh|N> - delete recent messages\n/info - tool and skill inventory\n/help - this message",
        )
    }
}

struct DeletePlan {
    max_age: Option<chrono::Duration>,
    max_count: Option<usize>,
}

impl DeletePlan {
    fn filter(&self, mut messages: Vec<(String, DateTime<Utc>)>) -> Vec<String> {
        if let Some(max_age) = self.max_age {
            let cutoff = Utc::now() - max_age;
            messages.retain(|(_, ts)| *ts >= cutoff);
        }
        messages.sort_by_key(|(_, ts)| std::cmp::Reverse(*ts));
        if let Some(max_count) = self.max_count {
            messages.truncate(max_count);
        }
        messages.into_iter().map(|(id, _)| id).collect()
    }
}

/// Parses `today`, `<N>h` (1..=168), or `<N>` (1..=500). Strict: any
/// malformed input returns `None` so the caller can send a usage error.
fn parse_delete_spec(arg: &str) -> Option<DeletePlan> {
    if arg == "today" {
        let midnight = Utc::now().date_naive().and_hms_opt(0, 0, 0)?.and_utc();
        let age = Utc::now().signed_duration_since(midnight);
        return Some(DeletePlan { max_age: Some(age), max_count: None });
    }
    if let Some(hours) = arg.strip_suffix('h') {
        let hours: u32 = hours.parse().ok()?;
        if !(1..=168).contains(&hours) {
            return None;
        }
        return Some(DeletePlan { max_age: Some(chrono::Duration::hours(i64::from(hours))), max_count: None });
    }
    let count: usize = arg.parse().ok()?;
    if !(1..=500).contains(&count) {
        return None;
    }
    Some(DeletePlan { max_age: None, max_count: Some(count) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_delete_spec_rejects_out_of_range_hours() {
        assert!(parse_delete_spec("169h").is_none());
        assert!(parse_delete_spec("0h").is_none());
    }

    #[test]
    fn parse_delete_spec_accepts_count() {
        let plan = parse_delete_spec("42").unwrap();
        assert_eq!(plan.max_count, Some(42));
    }

    #[test]
    fn parse_delete_spec_rejects_garbage() {
        assert!(parse_delete_spec("soon").is_none());
        assert!(parse_delete_spec("501").is_none());
    }

    #[tokio::test]
    async fn unknown_command_is_not_handled() {
        let router = ToolRouter::new();
        let agents = AgentSupervisor::new(std::env::temp_dir(), "http://127.0.0.1:0");
        let handler = SlashCommandHandler::new();
        let ctx = SlashCommandContext {
            router: &router,
            agents: &agents,
            agent_ids: &[],
            channel: "telegram",
            chat_id: "c1",
            started_at: Utc::now(),
            enabled_skills: &[],
        };
        let outcome = handler.handle("/bogus", &ctx).await;
        assert!(!outcome.handled);
    }

    #[tokio::test]
    async fn help_is_always_handled() {
        let router = ToolRouter::new();
        let agents = AgentSupervisor::new(std::env::temp_dir(), "http://127.0.0.1:0");
        let handler = SlashCommandHandler::new();
        let ctx = SlashCommandContext {
            router: &router,
            agents: &agents,
            agent_ids: &[],
            channel: "telegram",
            chat_id: "c1",
            started_at: Utc::now(),
            enabled_skills: &[],
        };
        let outcome = handler.handle("/help", &ctx).await;
        assert!(outcome.handled);
        assert!(outcome.response.unwrap().contains("/status"));
    }
}
