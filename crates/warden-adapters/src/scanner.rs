// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scanner Wrapper: decorates a [`ToolServerClient`] with pre/post content
//! scanning against a designated scanner client (§4.B).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use warden_core::ToolDescriptor;

use crate::rpc_client::{RpcError, ToolCallOutcome, ToolServerClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    Block,
    Allow,
}

#[derive(Debug, Serialize)]
struct AuditEntry {
    scan_id: String,
    timestamp: chrono::DateTime<Utc>,
    source: String,
    content_hash: String,
    safe: bool,
    confidence: f64,
    threats: Vec<String>,
    latency_ms: u64,
}

/// Result of a scan, whether the scanner ran successfully or was
/// unreachable (the latter resolved by `FailMode`).
struct ScanOutcome {
    safe: bool,
    confidence: f64,
    threats: Vec<String>,
}

pub struct ScannerWrapper {
    inner: Arc<dyn ToolServerClient>,
    scanner: Arc<dyn ToolServerClient>,
    scan_input: bool,
    scan_output: bool,
    fail_mode: FailMode,
    audit_log_path: std::path::PathBuf,
}

impl ScannerWrapper {
    pub fn new(
        inner: Arc<dyn ToolServerClient>,
        scanner: Arc<dyn ToolServerClient>,
        scan_input: bool,
        scan_output: bool,
        fail_mode: FailMode,
        audit_log_path: std::path::PathBuf,
    ) -> Self {
        Self { inner, scanner, scan_input, scan_output, fail_mode, audit_log_path }
    }

    /// Deterministic serialization: `serde_json::Value`'s default map type
    /// is a `BTreeMap` (alphabetical key order) so the same logical content
    /// always hashes the same way regardless of field insertion order.
    fn canonical_bytes(content: &Value) -> Vec<u8> {
        serde_json::to_vec(content).unwrap_or_default()
    }

    async fn scan(&self, source: &str, content: &Value) -> Result<(), RpcError> {
        let bytes = Self::canonical_bytes(content);
        let hash = format!("{:x}", Sha256::digest(&bytes));
        let started = std::time::Instant::now();

        let outcome = match self
            .scanner
            .call("scan", serde_json::json!({ "content": String::from_utf8_lossy(&bytes) }))
            .await
        {
            Ok(ToolCallOutcome { success: true, content, .. }) => parse_scan_result(content),
            Ok(ToolCallOutcome { success: false, .. }) | Err(_) => match self.fail_mode {
                FailMode::Allow => ScanOutcome { safe: true, confidence: 0.0, threats: vec![] },
                FailMode::Block => ScanOutcome { safe: false, confidence: 0.0, threats: vec!["scanner_unreachable".into()] },
            },
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let scan_id = uuid::Uuid::new_v4().to_string();
        self.append_audit(AuditEntry {
            scan_id,
            timestamp: Utc::now(),
            source: source.to_string(),
            content_hash: hash,
            safe: outcome.safe,
            confidence: outcome.confidence,
            threats: outcome.threats.clone(),
            latency_ms,
        })
        .await;

        if outcome.safe {
            Ok(())
        } else {
            Err(RpcError::CallFailed(format!("scanner blocked content from {source}: {:?}", outcome.threats)))
        }
    }

    async fn append_audit(&self, entry: AuditEntry) {
        let Ok(mut line) = serde_json::to_vec(&entry) else { return };
        line.push(b'\n');
        if let Ok(mut file) = tokio::fs::OpenOptions::new().create(true).append(true).open(&self.audit_log_path).await {
            let _ = file.write_all(&line).await;
        }
    }
}

fn parse_scan_result(content: Option<Value>) -> ScanOutcome {
    let Some(content) = content else {
        return ScanOutcome { safe: true, confidence: 0.0, threats: vec![] };
    };
    ScanOutcome {
        safe: content.get("safe").and_then(Value::as_bool).unwrap_or(true),
        confidence: content.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
        threats: content
            .get("threats")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
    }
}

#[async_trait]
impl ToolServerClient for ScannerWrapper {
    async fn call(&self, tool_name: &str, arguments: Value) -> Result<ToolCallOutcome, RpcError> {
        if self.scan_input {
            if let Err(e) = self.scan(&format!("input:{tool_name}"), &arguments).await {
                return Ok(ToolCallOutcome { success: false, content: None, error: Some(e.to_string()) });
            }
        }

        let outcome = self.inner.call(tool_name, arguments).await?;

        if outcome.success && self.scan_output {
            if let Some(content) = &outcome.content {
                if let Err(e) = self.scan(&format!("output:{tool_name}"), content).await {
                    return Ok(ToolCallOutcome { success: false, content: None, error: Some(e.to_string()) });
                }
            }
        }

        Ok(outcome)
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, RpcError> {
        self.inner.list_tools().await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }

    async fn restart(&self) -> Result<(), RpcError> {
        self.inner.restart().await
    }

    async fn stop(&self) -> Result<(), RpcError> {
        self.inner.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_client::ToolCallOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeClient {
        calls: AtomicUsize,
        respond_safe: bool,
    }

    #[async_trait]
    impl ToolServerClient for FakeClient {
        async fn call(&self, tool_name: &str, _arguments: Value) -> Result<ToolCallOutcome, RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if tool_name == "scan" {
                return Ok(ToolCallOutcome {
                    success: true,
                    content: Some(serde_json::json!({ "safe": self.respond_safe, "confidence": 0.9, "threats": [] })),
                    error: None,
                });
            }
            Ok(ToolCallOutcome { success: true, content: Some(serde_json::json!({"ok": true})), error: None })
        }
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, RpcError> {
            Ok(vec![])
        }
        async fn health_check(&self) -> bool {
            true
        }
        async fn restart(&self) -> Result<(), RpcError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), RpcError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn blocks_call_when_scanner_flags_input_unsafe() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = ScannerWrapper::new(
            Arc::new(FakeClient { calls: AtomicUsize::new(0), respond_safe: true }),
            Arc::new(FakeClient { calls: AtomicUsize::new(0), respond_safe: false }),
            true,
            false,
            FailMode::Block,
            dir.path().join("audit.jsonl"),
        );
        let result = wrapper.call("write_file", serde_json::json!({"path": "/etc/passwd"})).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn allows_call_when_scanner_unreachable_and_fail_mode_allow() {
        let dir = tempfile::tempdir().unwrap();
        struct Unreachable;
        #[async_trait]
        impl ToolServerClient for Unreachable {
            async fn call(&self, _: &str, _: Value) -> Result<ToolCallOutcome, RpcError> {
                Err(RpcError::NotRunning)
            }
            async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, RpcError> {
                Ok(vec![])
            }
            async fn health_check(&self) -> bool {
                false
            }
            async fn restart(&self) -> Result<(), RpcError> {
                Ok(())
            }
            async fn stop(&self) -> Result<(), RpcError> {
                Ok(())
            }
        }
        let wrapper = ScannerWrapper::new(
            Arc::new(FakeClient { calls: AtomicUsize::new(0), respond_safe: true }),
            Arc::new(Unreachable),
            true,
            false,
            FailMode::Allow,
            dir.path().join("audit.jsonl"),
        );
        let result = wrapper.call("read_file", serde_json::json!({})).await.unwrap();
        assert!(result.success);
    }

    #[test]
    fn canonical_bytes_is_order_independent() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(ScannerWrapper::canonical_bytes(&a), ScannerWrapper::canonical_bytes(&b));
    }
}
