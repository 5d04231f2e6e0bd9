// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler (§4.J): the once-a-minute job pass and skill pass, using the
//! `cron` + `chrono`/`chrono-tz` engine described in §4.J.1.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use parking_lot::RwLock;
use warden_adapters::channel::ChannelAdapter;
use warden_adapters::reasoner_client::ExecuteSkillRequest;
use warden_core::{HaltState, Job, JobAction, RunStatus, Skill, TriggerConfig, HALT_ALL};
use warden_router::ToolRouter;
use warden_supervisor::AgentSupervisor;

pub const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);
pub const HALT_TARGET: &str = "inngest";
const MAX_JOBS_PER_TICK: usize = 200;
const MAX_SKILLS_PER_TICK: usize = 200;

/// Whether `prev_minute_start`'s next scheduled fire falls within the
/// current minute window — the tick-jitter-independent "due" predicate
/// from §4.J's "key algorithmic subtleties".
fn cron_is_due(expression: &str, timezone: &str, prev_minute_start: DateTime<Utc>, minute_start: DateTime<Utc>) -> bool {
    let Ok(schedule) = Schedule::from_str(&normalize_cron(expression)) else { return false };
    let Ok(tz): Result<Tz, _> = timezone.parse() else { return false };
    let prev_in_tz = prev_minute_start.with_timezone(&tz);
    let Some(next) = schedule.after(&prev_in_tz).next() else { return false };
    let next_utc = next.with_timezone(&Utc);
    next_utc >= minute_start && next_utc < minute_start + Duration::seconds(60)
}

/// The data model stores the standard five-field expression (minute hour
/// day-of-month month day-of-week); the `cron` crate parses the seconds-
/// first six/seven-field form. Six- and seven-field expressions pass
/// through unchanged so an operator who already wrote a seconds field
/// still works.
fn normalize_cron(expression: &str) -> String {
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

pub struct SchedulerContext {
    pub router: Arc<ToolRouter>,
    pub agents: Arc<AgentSupervisor>,
    pub halt: Arc<HaltState>,
    pub default_agent_id: warden_core::AgentId,
    pub channels: RwLock<HashMap<String, Arc<dyn ChannelAdapter>>>,
}

/// Runs the job pass and skill pass on each tick, serialized so ticks
/// never overlap (§5 "Ordering guarantees").
pub struct Scheduler {
    ctx: Arc<SchedulerContext>,
    jobs: RwLock<Vec<Job>>,
    skills: RwLock<Vec<Skill>>,
    tick_lock: tokio::sync::Mutex<()>,
}

impl Scheduler {
    pub fn new(ctx: Arc<SchedulerContext>) -> Self {
        Self { ctx, jobs: RwLock::new(Vec::new()), skills: RwLock::new(Vec::new()), tick_lock: tokio::sync::Mutex::new(()) }
    }

    pub fn load_jobs(&self, jobs: Vec<Job>) {
        *self.jobs.write() = jobs;
    }

    pub fn load_skills(&self, skills: Vec<Skill>) {
        *self.skills.write() = skills;
    }

    pub fn jobs_snapshot(&self) -> Vec<Job> {
        self.jobs.read().clone()
    }

    pub fn skills_snapshot(&self) -> Vec<Skill> {
        self.skills.read().clone()
    }

    /// Runs one tick. `now` is passed in (rather than read from the system
    /// clock internally) so tests can drive exact minute boundaries.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let _guard = self.tick_lock.lock().await;
        if self.ctx.halt.is_halted(HALT_TARGET) || self.ctx.halt.is_halted(HALT_ALL) {
            return;
        }

        let minute_start = truncate_to_minute(now);
        let prev_minute_start = minute_start - Duration::seconds(60);

        self.job_pass(now, prev_minute_start, minute_start).await;
        self.skill_pass(now, prev_minute_start, minute_start).await;
    }

    async fn job_pass(&self, now: DateTime<Utc>, prev_minute_start: DateTime<Utc>, minute_start: DateTime<Utc>) {
        let due_ids: Vec<warden_core::JobId> = {
            let jobs = self.jobs.read();
            jobs.iter()
                .filter(|j| j.enabled && !j.is_terminated(now))
                .filter(|j| job_is_due(j, prev_minute_start, minute_start))
                .take(MAX_JOBS_PER_TICK)
                .map(|j| j.id.clone())
                .collect()
        };

        for job_id in due_ids {
            let (action, name) = {
                let jobs = self.jobs.read();
                let Some(job) = jobs.iter().find(|j| j.id == job_id) else { continue };
                (job.action.clone(), job.name.clone())
            };

            let result = self.execute_job_action(&action).await;

            let mut jobs = self.jobs.write();
            if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
                job.record_run(now);
            }
            drop(jobs);

            if result.is_err() {
                tracing::warn!(job = %name, "scheduled job failed");
                self.notify_default(&format!("job '{name}' failed")).await;
            }
        }
    }

    async fn execute_job_action(&self, action: &JobAction) -> Result<(), warden_router::RouteError> {
        match action {
            JobAction::ToolCall { tool_name, parameters } => {
                self.ctx.router.route(tool_name, parameters.clone()).await?;
                Ok(())
            }
            JobAction::Workflow { steps } => {
                let mut completed: HashSet<&str> = HashSet::new();
                for step in steps {
                    if !step.depends_on.iter().all(|d| completed.contains(d.as_str())) {
                        continue;
                    }
                    self.ctx.router.route(&step.tool_name, step.parameters.clone()).await?;
                    completed.insert(step.id.as_str());
                }
                Ok(())
            }
        }
    }

    async fn skill_pass(&self, now: DateTime<Utc>, prev_minute_start: DateTime<Utc>, minute_start: DateTime<Utc>) {
        self.auto_enable_skills();

        let due_ids: Vec<warden_core::SkillId> = {
            let skills = self.skills.read();
            skills
                .iter()
                .filter(|s| s.enabled)
                .filter(|s| !s.in_failure_cooldown(now))
                .filter(|s| skill_is_due(s, now, prev_minute_start, minute_start))
                .take(MAX_SKILLS_PER_TICK)
                .map(|s| s.id.clone())
                .collect()
        };

        for skill_id in due_ids {
            let snapshot = {
                let skills = self.skills.read();
                skills.iter().find(|s| s.id == skill_id).cloned()
            };
            let Some(skill) = snapshot else { continue };

            let outcome = self.execute_skill(&skill).await;

            let mut skills = self.skills.write();
            if let Some(s) = skills.iter_mut().find(|s| s.id == skill_id) {
                match &outcome {
                    Ok(summary) => s.record_run(now, RunStatus::Success, summary.clone()),
                    Err(e) => s.record_run(now, RunStatus::Error, e.clone()),
                }
            }
            drop(skills);

            if let Err(e) = outcome {
                self.notify_default(&format!("skill '{}' failed: {e}; retry in 5m", skill.name)).await;
            }
        }
    }

    fn auto_enable_skills(&self) {
        let router = self.ctx.router.clone();
        let mut skills = self.skills.write();
        for skill in skills.iter_mut() {
            if !skill.is_auto_enable_candidate() {
                continue;
            }
            if skill.required_tools.iter().all(|t| router.has_route(t)) {
                skill.enabled = true;
            }
        }
    }

    async fn execute_skill(&self, skill: &Skill) -> Result<String, String> {
        let available = self.ctx.agents.ensure_running(&self.ctx.default_agent_id).await.map_err(|e| e.to_string())?;
        if !available {
            return Err("default agent unavailable".to_string());
        }

        let client = self.ctx.agents.reasoner_client(&self.ctx.default_agent_id).await.map_err(|e| e.to_string())?;
        let chat_id = self.default_notify_chat_id().await;

        let response = client
            .execute_skill(ExecuteSkillRequest {
                skill_id: skill.id.to_string(),
                skill_name: Some(skill.name.clone()),
                instructions: skill.instructions.clone(),
                max_steps: skill.max_steps,
                notify_on_completion: skill.notify_on_completion,
                no_tools: false,
                required_tools: skill.required_tools.clone(),
                chat_id: chat_id.clone(),
            })
            .await
            .map_err(|e| e.to_string())?;

        if response.success {
            if skill.notify_on_completion {
                self.notify_default(&format!("skill '{}' completed: {}", skill.name, response.summary)).await;
            }
            Ok(response.summary)
        } else {
            Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
        }
    }

    async fn default_notify_chat_id(&self) -> Option<String> {
        let channels = self.ctx.channels.read().values().cloned().collect::<Vec<_>>();
        for adapter in channels {
            if let Some(chat_id) = adapter.monitored_chat_ids().await.into_iter().next() {
                return Some(chat_id);
            }
        }
        None
    }

    async fn notify_default(&self, text: &str) {
        let Some(adapter) = self.ctx.channels.read().values().next().cloned() else { return };
        if let Some(chat_id) = adapter.monitored_chat_ids().await.into_iter().next() {
            let _ = adapter.send(&chat_id, text).await;
        }
    }
}

fn truncate_to_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::seconds(i64::from(now_second(now))) - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()))
}

fn now_second(now: DateTime<Utc>) -> u32 {
    use chrono::Timelike;
    now.second()
}

fn job_is_due(job: &Job, prev_minute_start: DateTime<Utc>, minute_start: DateTime<Utc>) -> bool {
    if job.last_run_at.is_some_and(|last| last >= minute_start) {
        return false;
    }
    match job.job_type {
        // `recurring` shares the cron job's minute-aligned due predicate —
        // SPEC_FULL's data model gives it no separate cadence field, so it
        // fires on the same `cronExpression`/`timezone` pair a cron job would.
        warden_core::JobType::Cron | warden_core::JobType::Recurring => {
            let (Some(expression), Some(timezone)) = (&job.cron_expression, &job.timezone) else { return false };
            cron_is_due(expression, timezone, prev_minute_start, minute_start)
        }
        // One-shot: due the first tick at or after `scheduledAt`, never again
        // (`last_run_at` being set already excludes it via the check above).
        warden_core::JobType::Scheduled => job.last_run_at.is_none() && job.scheduled_at.is_some_and(|at| at < minute_start + Duration::seconds(60)),
    }
}

fn skill_is_due(skill: &Skill, now: DateTime<Utc>, prev_minute_start: DateTime<Utc>, minute_start: DateTime<Utc>) -> bool {
    match &skill.trigger_config {
        TriggerConfig::Cron { schedule, timezone } => {
            if skill.last_run_at.is_some_and(|last| last >= minute_start) {
                return false;
            }
            cron_is_due(schedule, timezone, prev_minute_start, minute_start)
        }
        TriggerConfig::Interval { .. } => skill.is_due_by_interval(now),
        TriggerConfig::Manual => false,
    }
}
