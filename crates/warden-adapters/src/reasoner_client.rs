// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reasoner Client (§4.M): a localhost HTTP client bound to one
//! [`warden_core::ManagedAgent`]'s resolved port, implementing the four
//! endpoints of the reasoner subprocess protocol (§6).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const SKILL_CALL_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Error, Clone)]
pub enum ReasonerError {
    #[error("reasoner unreachable: {0}")]
    Unreachable(String),
    #[error("reasoner returned malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Serialize)]
pub struct ProcessMessageRequest {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    pub date: chrono::DateTime<chrono::Utc>,
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessMessageResponse {
    pub success: bool,
    pub response: Option<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    pub total_steps: u32,
    pub error: Option<String>,
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Serialize)]
pub struct ExecuteSkillRequest {
    pub skill_id: String,
    pub skill_name: Option<String>,
    pub instructions: String,
    pub max_steps: u32,
    pub notify_on_completion: bool,
    #[serde(default)]
    pub no_tools: bool,
    #[serde(default)]
    pub required_tools: Vec<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteSkillResponse {
    pub success: bool,
    pub summary: String,
    #[serde(default)]
    pub tools_used: Vec<String>,
    pub total_steps: u32,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CostResumeRequest {
    pub reset_window: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CostResumeResponse {
    pub success: bool,
    pub message: String,
}

/// The contract the Dispatch Pipeline, Agent Supervisor, and Scheduler use
/// to talk to a spawned reasoner, so tests can substitute a fake.
#[async_trait]
pub trait ReasonerClient: Send + Sync {
    async fn health(&self) -> bool;
    async fn process_message(&self, request: ProcessMessageRequest) -> Result<ProcessMessageResponse, ReasonerError>;
    async fn execute_skill(&self, request: ExecuteSkillRequest) -> Result<ExecuteSkillResponse, ReasonerError>;
    async fn cost_resume(&self, request: CostResumeRequest) -> Result<CostResumeResponse, ReasonerError>;
}

pub struct HttpReasonerClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpReasonerClient {
    pub fn new(port: u16) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ReasonerClient for HttpReasonerClient {
    async fn health(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn process_message(&self, request: ProcessMessageRequest) -> Result<ProcessMessageResponse, ReasonerError> {
        self.http
            .post(format!("{}/process-message", self.base_url))
            .timeout(DEFAULT_CALL_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| ReasonerError::Unreachable(e.to_string()))?
            .json()
            .await
            .map_err(|e| ReasonerError::Malformed(e.to_string()))
    }

    async fn execute_skill(&self, request: ExecuteSkillRequest) -> Result<ExecuteSkillResponse, ReasonerError> {
        self.http
            .post(format!("{}/execute-skill", self.base_url))
            .timeout(SKILL_CALL_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| ReasonerError::Unreachable(e.to_string()))?
            .json()
            .await
            .map_err(|e| ReasonerError::Malformed(e.to_string()))
    }

    async fn cost_resume(&self, request: CostResumeRequest) -> Result<CostResumeResponse, ReasonerError> {
        self.http
            .post(format!("{}/cost-resume", self.base_url))
            .timeout(DEFAULT_CALL_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| ReasonerError::Unreachable(e.to_string()))?
            .json()
            .await
            .map_err(|e| ReasonerError::Malformed(e.to_string()))
    }
}
