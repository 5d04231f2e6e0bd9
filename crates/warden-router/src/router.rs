// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use glob::Pattern;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use warden_adapters::{ToolCallOutcome, ToolServerClient};
use warden_core::{ToolDescriptor, ToolRoute};

#[derive(Debug, Error, Clone)]
pub enum RouteError {
    #[error("no route for tool {0}")]
    NotFound(String),
    #[error("tool blocked: {0}")]
    Blocked(String),
    #[error("tool server call failed: {0}")]
    CallFailed(String),
}

struct RegisteredServer {
    client: Arc<dyn ToolServerClient>,
    allow_destructive_tools: bool,
}

/// Owns the global `exposedName -> ToolRoute` map (§4.C).
pub struct ToolRouter {
    servers: RwLock<HashMap<String, RegisteredServer>>,
    routes: RwLock<HashMap<String, ToolRoute>>,
    blocked: RwLock<HashMap<String, ToolRoute>>,
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRouter {
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            routes: RwLock::new(HashMap::new()),
            blocked: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_server(&self, name: impl Into<String>, client: Arc<dyn ToolServerClient>, allow_destructive_tools: bool) {
        self.servers.write().insert(name.into(), RegisteredServer { client, allow_destructive_tools });
    }

    /// Calls `ListTools` on every registered server concurrently and
    /// populates the route table. Collisions keep the first-seen route.
    pub async fn discover(&self) -> Vec<String> {
        let servers: Vec<(String, Arc<dyn ToolServerClient>, bool)> = self
            .servers
            .read()
            .iter()
            .map(|(name, s)| (name.clone(), s.client.clone(), s.allow_destructive_tools))
            .collect();

        let mut warnings = Vec::new();
        let futures = servers.into_iter().map(|(name, client, allow_destructive)| async move {
            let tools = client.list_tools().await.unwrap_or_default();
            (name, allow_destructive, tools)
        });
        let discovered = futures::future::join_all(futures).await;

        for (name, allow_destructive, tools) in discovered {
            for descriptor in tools {
                self.add_route(&name, descriptor, allow_destructive, &mut warnings);
            }
        }
        warnings
    }

    /// Refreshes only the routes owned by `name`, used after a tool-server
    /// restart. Does not disturb other servers' routes (§4.C.1b).
    pub fn refresh_server(&self, name: &str, tools: Vec<ToolDescriptor>) {
        let allow_destructive = self.servers.read().get(name).map(|s| s.allow_destructive_tools).unwrap_or(false);

        self.routes.write().retain(|_, route| route.server_name != name);
        self.blocked.write().retain(|_, route| route.server_name != name);

        let mut warnings = Vec::new();
        for descriptor in tools {
            self.add_route(name, descriptor, allow_destructive, &mut warnings);
        }
    }

    fn add_route(&self, server_name: &str, descriptor: ToolDescriptor, allow_destructive: bool, warnings: &mut Vec<String>) {
        let route = ToolRoute::from_descriptor(server_name, descriptor);
        let exposed_name = route.exposed_name.clone();

        if self.routes.read().contains_key(&exposed_name) || self.blocked.read().contains_key(&exposed_name) {
            warnings.push(format!("duplicate tool route ignored: {exposed_name}"));
            return;
        }

        if route.destructive_hint && !allow_destructive {
            self.blocked.write().insert(exposed_name, route);
        } else {
            self.routes.write().insert(exposed_name, route);
        }
    }

    pub fn has_route(&self, exposed_name: &str) -> bool {
        self.routes.read().contains_key(exposed_name)
    }

    pub fn get_blocked_tools(&self) -> Vec<String> {
        self.blocked.read().keys().cloned().collect()
    }

    pub fn tool_definitions(&self) -> Vec<ToolRoute> {
        self.routes.read().values().cloned().collect()
    }

    /// Per-agent tool filtering (§4.C.1): deny-then-allow glob matching.
    pub fn filtered_tool_definitions(&self, allowed: &[String], denied: &[String]) -> Vec<ToolRoute> {
        self.tool_definitions()
            .into_iter()
            .filter(|route| !matches_any(&route.exposed_name, denied))
            .filter(|route| allowed.is_empty() || matches_any(&route.exposed_name, allowed))
            .collect()
    }

    pub async fn route(&self, exposed_name: &str, arguments: Value) -> Result<ToolCallOutcome, RouteError> {
        if self.blocked.read().contains_key(exposed_name) {
            return Err(RouteError::Blocked(exposed_name.to_string()));
        }

        let (client, original_name) = {
            let routes = self.routes.read();
            let route = routes.get(exposed_name).ok_or_else(|| RouteError::NotFound(exposed_name.to_string()))?;
            let servers = self.servers.read();
            let server = servers.get(&route.server_name).ok_or_else(|| RouteError::NotFound(exposed_name.to_string()))?;
            (server.client.clone(), route.original_name.clone())
        };

        client.call(&original_name, arguments).await.map_err(|e| RouteError::CallFailed(e.to_string()))
    }
}

fn matches_any(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| Pattern::new(p).map(|pat| pat.matches(name)).unwrap_or(false))
}
