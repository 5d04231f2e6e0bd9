// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory channel adapter for dispatch-pipeline and channel-manager tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use warden_core::IncomingMessage;

use super::{ChannelAdapter, ChannelError};

#[derive(Debug, Default)]
pub struct FakeChannelAdapter {
    channel: String,
    inbox: Mutex<Vec<IncomingMessage>>,
    sent: Mutex<Vec<(String, String)>>,
    monitored: Mutex<Vec<String>>,
    initialized: Mutex<bool>,
}

impl FakeChannelAdapter {
    pub fn new(channel: impl Into<String>) -> Self {
        Self { channel: channel.into(), ..Default::default() }
    }

    pub fn push_incoming(&self, chat_id: &str, sender_id: &str, text: &str) {
        let id = format!("{}-{}", chat_id, self.inbox.lock().len());
        self.inbox.lock().push(IncomingMessage {
            id,
            channel: self.channel.clone(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
            agent_id_hint: None,
        });
        let mut monitored = self.monitored.lock();
        if !monitored.iter().any(|c| c == chat_id) {
            monitored.push(chat_id.to_string());
        }
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ChannelAdapter for FakeChannelAdapter {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn initialize(&self) -> Result<(), ChannelError> {
        *self.initialized.lock() = true;
        Ok(())
    }

    async fn poll(&self) -> Result<Vec<IncomingMessage>, ChannelError> {
        Ok(std::mem::take(&mut self.inbox.lock()))
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().push((chat_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn monitored_chat_ids(&self) -> Vec<String> {
        self.monitored.lock().clone()
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        *self.initialized.lock() = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn poll_drains_inbox_once() {
        let adapter = FakeChannelAdapter::new("telegram");
        adapter.push_incoming("c1", "u1", "hello");
        let first = adapter.poll().await.unwrap();
        assert_eq!(first.len(), 1);
        let second = adapter.poll().await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn send_is_recorded() {
        let adapter = FakeChannelAdapter::new("telegram");
        adapter.send("c1", "hi").await.unwrap();
        assert_eq!(adapter.sent_messages(), vec![("c1".to_string(), "hi".to_string())]);
    }
}
