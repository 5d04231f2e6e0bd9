// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler-managed direct tool calls and workflows (no LLM involved).
//! See [`crate::skill::Skill`] for the LLM-driven counterpart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::JobId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub tool_name: String,
    pub parameters: Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobAction {
    ToolCall { tool_name: String, parameters: Value },
    Workflow { steps: Vec<WorkflowStep> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Cron,
    Scheduled,
    Recurring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub job_type: JobType,
    pub cron_expression: Option<String>,
    pub timezone: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub action: JobAction,
    pub enabled: bool,
    pub run_count: u32,
    pub max_runs: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Whether this job should be skipped outright before cron evaluation,
    /// per the termination checks in the job pass: expired or run-capped.
    pub fn is_terminated(&self, now: DateTime<Utc>) -> bool {
        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                return true;
            }
        }
        if let Some(max_runs) = self.max_runs {
            if self.run_count >= max_runs {
                return true;
            }
        }
        false
    }

    /// Records a completed run (success or failure both bump these fields —
    /// failure still advances `last_run_at` to avoid retry storms) and
    /// auto-disables once the run cap is reached.
    pub fn record_run(&mut self, at: DateTime<Utc>) {
        self.run_count += 1;
        self.last_run_at = Some(at);
        if let Some(max_runs) = self.max_runs {
            if self.run_count >= max_runs {
                self.enabled = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job {
            id: JobId::new("j1"),
            name: "nightly-cleanup".into(),
            job_type: JobType::Cron,
            cron_expression: Some("0 9 * * *".into()),
            timezone: Some("UTC".into()),
            scheduled_at: None,
            action: JobAction::ToolCall {
                tool_name: "fs_cleanup".into(),
                parameters: Value::Null,
            },
            enabled: true,
            run_count: 0,
            max_runs: Some(2),
            expires_at: None,
            last_run_at: None,
        }
    }

    #[test]
    fn record_run_auto_disables_at_max_runs() {
        let mut j = job();
        let t = Utc::now();
        j.record_run(t);
        assert!(j.enabled);
        j.record_run(t);
        assert!(!j.enabled);
        assert_eq!(j.run_count, 2);
    }

    #[test]
    fn is_terminated_when_expired() {
        let mut j = job();
        j.max_runs = None;
        j.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(j.is_terminated(Utc::now()));
    }

    #[test]
    fn is_not_terminated_when_under_cap_and_not_expired() {
        let j = job();
        assert!(!j.is_terminated(Utc::now()));
    }
}
