// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message Router (§4.G): three-pass resolution of an incoming message to
//! a target agent over an immutable, runtime-replaceable bindings list.

use parking_lot::RwLock;
use warden_core::{AgentId, ChannelBinding, WILDCARD_CHAT_ID};

pub struct MessageRouter {
    bindings: RwLock<Vec<ChannelBinding>>,
    default_agent_id: AgentId,
}

impl MessageRouter {
    pub fn new(default_agent_id: AgentId) -> Self {
        Self { bindings: RwLock::new(Vec::new()), default_agent_id }
    }

    pub fn update_bindings(&self, bindings: Vec<ChannelBinding>) {
        *self.bindings.write() = bindings;
    }

    /// Exact `(channel, chatId)` match, then wildcard `(channel, "*")`,
    /// then the configured default agent.
    pub fn resolve(&self, channel: &str, chat_id: &str) -> AgentId {
        let bindings = self.bindings.read();

        if let Some(binding) = bindings.iter().find(|b| b.channel == channel && b.chat_id_pattern == chat_id) {
            return binding.agent_id.clone();
        }
        if let Some(binding) = bindings.iter().find(|b| b.channel == channel && b.chat_id_pattern == WILDCARD_CHAT_ID) {
            return binding.agent_id.clone();
        }
        self.default_agent_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(channel: &str, pattern: &str, agent: &str) -> ChannelBinding {
        ChannelBinding { channel: channel.into(), chat_id_pattern: pattern.into(), agent_id: AgentId::new(agent) }
    }

    #[test]
    fn exact_match_wins_over_wildcard() {
        let router = MessageRouter::new(AgentId::new("default"));
        router.update_bindings(vec![binding("telegram", "*", "wild"), binding("telegram", "c1", "exact")]);
        assert_eq!(router.resolve("telegram", "c1"), AgentId::new("exact"));
    }

    #[test]
    fn wildcard_match_when_no_exact() {
        let router = MessageRouter::new(AgentId::new("default"));
        router.update_bindings(vec![binding("telegram", "*", "wild")]);
        assert_eq!(router.resolve("telegram", "c2"), AgentId::new("wild"));
    }

    #[test]
    fn falls_through_to_default_agent() {
        let router = MessageRouter::new(AgentId::new("default"));
        router.update_bindings(vec![binding("slack", "*", "wild")]);
        assert_eq!(router.resolve("telegram", "c1"), AgentId::new("default"));
    }
}
