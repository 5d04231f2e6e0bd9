// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler-managed instruction templates fired on cron or interval and
//! executed by a reasoner. See [`crate::job::Job`] for the tool-only,
//! no-LLM counterpart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::SkillId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Cron,
    Interval,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerConfig {
    Cron { schedule: String, timezone: String },
    Interval { interval_minutes: u32 },
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    pub name: String,
    pub enabled: bool,
    pub trigger_type: TriggerType,
    pub trigger_config: TriggerConfig,
    pub instructions: String,
    pub max_steps: u32,
    pub required_tools: Vec<String>,
    pub notify_on_completion: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunStatus>,
    pub last_run_summary: Option<String>,
}

/// How long a skill that last failed is skipped before being retried.
pub const FAILURE_COOLDOWN_MINUTES: i64 = 5;

impl Skill {
    /// Auto-enable eligibility: only disabled cron/interval skills with a
    /// non-empty `required_tools` list are candidates; skills with no
    /// required tools stay under manual toggle only (§4.J auto-enable).
    pub fn is_auto_enable_candidate(&self) -> bool {
        !self.enabled && !self.required_tools.is_empty()
    }

    pub fn in_failure_cooldown(&self, now: DateTime<Utc>) -> bool {
        matches!(self.last_run_status, Some(RunStatus::Error))
            && self
                .last_run_at
                .is_some_and(|t| now - t < chrono::Duration::minutes(FAILURE_COOLDOWN_MINUTES))
    }

    pub fn is_due_by_interval(&self, now: DateTime<Utc>) -> bool {
        let TriggerConfig::Interval { interval_minutes } = &self.trigger_config else {
            return false;
        };
        match self.last_run_at {
            None => true,
            Some(last) => now - last >= chrono::Duration::minutes(i64::from(*interval_minutes)),
        }
    }

    pub fn record_run(&mut self, at: DateTime<Utc>, status: RunStatus, summary: String) {
        self.last_run_at = Some(at);
        self.last_run_status = Some(status);
        self.last_run_summary = Some(summary);
    }
}
