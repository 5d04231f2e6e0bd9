// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory tool-server client used by Tool Router and Supervisor tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use warden_core::ToolDescriptor;

use crate::rpc_client::{RpcError, ToolCallOutcome, ToolServerClient};

#[derive(Default)]
pub struct FakeToolServerClient {
    pub tools: Mutex<Vec<ToolDescriptor>>,
    pub calls: Mutex<Vec<(String, Value)>>,
    pub healthy: Mutex<bool>,
    pub restart_count: Mutex<u32>,
}

impl FakeToolServerClient {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools: Mutex::new(tools), healthy: Mutex::new(true), ..Default::default() }
    }

    pub fn set_unhealthy(&self) {
        *self.healthy.lock() = false;
    }
}

#[async_trait]
impl ToolServerClient for FakeToolServerClient {
    async fn call(&self, tool_name: &str, arguments: Value) -> Result<ToolCallOutcome, RpcError> {
        self.calls.lock().push((tool_name.to_string(), arguments));
        Ok(ToolCallOutcome { success: true, content: Some(serde_json::json!({"ok": true})), error: None })
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, RpcError> {
        Ok(self.tools.lock().clone())
    }

    async fn health_check(&self) -> bool {
        *self.healthy.lock()
    }

    async fn restart(&self) -> Result<(), RpcError> {
        *self.restart_count.lock() += 1;
        *self.healthy.lock() = true;
        Ok(())
    }

    async fn stop(&self) -> Result<(), RpcError> {
        Ok(())
    }
}
