// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel Adapter interface (§4.D): per-channel driver the Channel
//! Manager polls on a fixed interval.

mod fake;

use async_trait::async_trait;
use thiserror::Error;
use warden_core::IncomingMessage;

pub use fake::FakeChannelAdapter;

#[derive(Debug, Error, Clone)]
pub enum ChannelError {
    #[error("channel adapter not initialized")]
    NotInitialized,
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("poll failed: {0}")]
    PollFailed(String),
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel(&self) -> &str;
    async fn initialize(&self) -> Result<(), ChannelError>;
    async fn poll(&self) -> Result<Vec<IncomingMessage>, ChannelError>;
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), ChannelError>;
    /// Chat ids this adapter already knows about, used by the Scheduler to
    /// pick a default notify-chat when no explicit one is configured.
    async fn monitored_chat_ids(&self) -> Vec<String>;
    async fn shutdown(&self) -> Result<(), ChannelError>;
}
