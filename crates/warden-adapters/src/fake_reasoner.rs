// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory reasoner used by Agent Supervisor and Dispatch Pipeline tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::reasoner_client::{
    CostResumeRequest, CostResumeResponse, ExecuteSkillRequest, ExecuteSkillResponse, ProcessMessageRequest,
    ProcessMessageResponse, ReasonerClient, ReasonerError,
};

#[derive(Default)]
pub struct FakeReasonerClient {
    pub healthy: Mutex<bool>,
    pub next_response: Mutex<Option<ProcessMessageResponse>>,
    pub received_messages: Mutex<Vec<ProcessMessageRequest>>,
    pub received_skills: Mutex<Vec<ExecuteSkillRequest>>,
    pub fail_health: Mutex<bool>,
}

impl FakeReasonerClient {
    pub fn new() -> Self {
        Self { healthy: Mutex::new(true), ..Default::default() }
    }

    pub fn set_next_response(&self, response: ProcessMessageResponse) {
        *self.next_response.lock() = Some(response);
    }

    pub fn set_unhealthy(&self) {
        *self.fail_health.lock() = true;
    }
}

#[async_trait]
impl ReasonerClient for FakeReasonerClient {
    async fn health(&self) -> bool {
        !*self.fail_health.lock()
    }

    async fn process_message(&self, request: ProcessMessageRequest) -> Result<ProcessMessageResponse, ReasonerError> {
        self.received_messages.lock().push(request);
        Ok(self.next_response.lock().take().unwrap_or(ProcessMessageResponse {
            success: true,
            response: Some("ok".to_string()),
            tools_used: vec![],
            total_steps: 1,
            error: None,
            paused: false,
        }))
    }

    async fn execute_skill(&self, request: ExecuteSkillRequest) -> Result<ExecuteSkillResponse, ReasonerError> {
        self.received_skills.lock().push(request);
        Ok(ExecuteSkillResponse { success: true, summary: "done".to_string(), tools_used: vec![], total_steps: 1, error: None })
    }

    async fn cost_resume(&self, _request: CostResumeRequest) -> Result<CostResumeResponse, ReasonerError> {
        Ok(CostResumeResponse { success: true, message: "resumed".to_string() })
    }
}
