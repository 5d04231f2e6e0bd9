// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC Client: owns one tool-server subprocess over a newline-delimited
//! JSON stdio transport (§4.A, §4.A.1).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::time::timeout;
use warden_core::ToolDescriptor;

use crate::subprocess::{self, HEALTH_CHECK_TIMEOUT, RPC_CALL_TIMEOUT};

#[derive(Debug, Error, Clone)]
pub enum RpcError {
    #[error("failed to spawn tool server: {0}")]
    SpawnFailed(String),
    #[error("tool server not running")]
    NotRunning,
    #[error("call timed out")]
    Timeout,
    #[error("tool server closed the connection")]
    ConnectionClosed,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("tool call failed: {0}")]
    CallFailed(String),
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub success: bool,
    pub content: Option<Value>,
    pub error: Option<String>,
}

/// The contract every tool-server client implements, so the Tool Router and
/// its tests can swap a real subprocess client for a fake.
#[async_trait]
pub trait ToolServerClient: Send + Sync {
    async fn call(&self, tool_name: &str, arguments: Value) -> Result<ToolCallOutcome, RpcError>;
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, RpcError>;
    async fn health_check(&self) -> bool;
    async fn restart(&self) -> Result<(), RpcError>;
    async fn stop(&self) -> Result<(), RpcError>;
}

#[derive(Default)]
struct PendingRequests {
    senders: SyncMutex<HashMap<u64, oneshot::Sender<WireResponse>>>,
}

struct RunningChild {
    child: Child,
    stdin: Arc<AsyncMutex<ChildStdin>>,
    pending: Arc<PendingRequests>,
    reader_task: tokio::task::JoinHandle<()>,
}

/// A tool server reached over stdio NDJSON, per §4.A.1.
pub struct RpcClient {
    server_name: String,
    command: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    next_id: AtomicU64,
    running: AsyncMutex<Option<RunningChild>>,
}

impl RpcClient {
    pub fn new(
        server_name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        env: Vec<(String, String)>,
        cwd: Option<PathBuf>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            command: command.into(),
            args,
            env,
            cwd,
            next_id: AtomicU64::new(1),
            running: AsyncMutex::new(None),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Idempotent on an already-stopped client.
    pub async fn start(&self) -> Result<(), RpcError> {
        let mut guard = self.running.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut child = subprocess::spawn_piped(&self.command, &self.args, &self.env, self.cwd.as_deref())
            .map_err(|e| RpcError::SpawnFailed(e.to_string()))?;

        let stdin = child.stdin.take().ok_or_else(|| RpcError::SpawnFailed("no stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| RpcError::SpawnFailed("no stdout".into()))?;
        let stderr = child.stderr.take();

        let pending = Arc::new(PendingRequests::default());
        let pending_for_reader = pending.clone();
        let server_name = self.server_name.clone();

        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<WireResponse>(&line) {
                        Ok(response) => {
                            if let Some(sender) = pending_for_reader.senders.lock().remove(&response.id) {
                                let _ = sender.send(response);
                            }
                        }
                        Err(_) => {
                            tracing::debug!(target: "tool_server_stdout", server = %server_name, line, "non-protocol stdout line");
                        }
                    },
                    Ok(None) | Err(_) => break,
                }
            }
        });

        if let Some(stderr) = stderr {
            let server_name = self.server_name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "tool_server_stderr", server = %server_name, line);
                }
            });
        }

        *guard = Some(RunningChild {
            child,
            stdin: Arc::new(AsyncMutex::new(stdin)),
            pending,
            reader_task,
        });
        Ok(())
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<WireResponse, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let stdin = {
            let guard = self.running.lock().await;
            let running = guard.as_ref().ok_or(RpcError::NotRunning)?;
            running.pending.senders.lock().insert(id, tx);
            running.stdin.clone()
        };

        let request = WireRequest { id, method, params };
        let mut line = serde_json::to_vec(&request).map_err(|e| RpcError::Malformed(e.to_string()))?;
        line.push(b'\n');

        {
            let mut stdin = stdin.lock().await;
            stdin.write_all(&line).await.map_err(|_| RpcError::ConnectionClosed)?;
            stdin.flush().await.map_err(|_| RpcError::ConnectionClosed)?;
        }

        timeout(RPC_CALL_TIMEOUT, rx).await.map_err(|_| RpcError::Timeout)?.map_err(|_| RpcError::ConnectionClosed)
    }
}

#[async_trait]
impl ToolServerClient for RpcClient {
    async fn call(&self, tool_name: &str, arguments: Value) -> Result<ToolCallOutcome, RpcError> {
        let response = self
            .send_request("call_tool", serde_json::json!({ "name": tool_name, "arguments": arguments }))
            .await?;
        match response.error {
            Some(error) => Ok(ToolCallOutcome { success: false, content: None, error: Some(error) }),
            None => Ok(ToolCallOutcome { success: true, content: response.result, error: None }),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, RpcError> {
        let response = self.send_request("list_tools", Value::Null).await?;
        let result = response.result.ok_or_else(|| RpcError::Malformed("missing result".into()))?;
        serde_json::from_value(result).map_err(|e| RpcError::Malformed(e.to_string()))
    }

    async fn health_check(&self) -> bool {
        match timeout(HEALTH_CHECK_TIMEOUT, self.send_request("health", Value::Null)).await {
            Ok(Ok(response)) => response.error.is_none(),
            _ => false,
        }
    }

    async fn restart(&self) -> Result<(), RpcError> {
        self.stop().await?;
        self.start().await
    }

    async fn stop(&self) -> Result<(), RpcError> {
        let mut guard = self.running.lock().await;
        if let Some(mut running) = guard.take() {
            running.reader_task.abort();
            subprocess::stop_gracefully(&mut running.child).await.map_err(|e| RpcError::SpawnFailed(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_is_idempotent_on_a_running_client() {
        let client = RpcClient::new("echo", "cat", vec![], vec![], None);
        client.start().await.expect("start");
        client.start().await.expect("start again is a no-op");
        client.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn health_check_false_when_not_started() {
        let client = RpcClient::new("echo", "cat", vec![], vec![], None);
        assert!(!client.health_check().await);
    }
}
