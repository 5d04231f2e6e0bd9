// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel bindings and incoming-message shape used by the Message Router
//! and Dispatch Pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::AgentId;

pub const WILDCARD_CHAT_ID: &str = "*";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelBinding {
    pub channel: String,
    pub chat_id_pattern: String,
    pub agent_id: AgentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: String,
    pub channel: String,
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub agent_id_hint: Option<AgentId>,
}
