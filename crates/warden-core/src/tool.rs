// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool catalog entries as published by a tool-server subprocess and
//! namespaced by the Tool Router.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool as a server's `list_tools` reports it, before namespacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub input_schema: Value,
    #[serde(default)]
    pub destructive_hint: bool,
    #[serde(default)]
    pub open_world_hint: bool,
}

/// A namespaced route entry owned by the Tool Router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRoute {
    pub exposed_name: String,
    pub server_name: String,
    pub original_name: String,
    pub input_schema: Value,
    pub destructive_hint: bool,
    pub open_world_hint: bool,
}

impl ToolRoute {
    pub fn exposed_name(server_name: &str, original_name: &str) -> String {
        format!("{server_name}_{original_name}")
    }

    pub fn from_descriptor(server_name: &str, descriptor: ToolDescriptor) -> Self {
        Self {
            exposed_name: Self::exposed_name(server_name, &descriptor.name),
            server_name: server_name.to_string(),
            original_name: descriptor.name,
            input_schema: descriptor.input_schema,
            destructive_hint: descriptor.destructive_hint,
            open_world_hint: descriptor.open_world_hint,
        }
    }
}
