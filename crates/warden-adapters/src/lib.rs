// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Process and network adapters: the RPC Client to tool-server subprocesses
//! (§4.A), the Scanner Wrapper (§4.B), the Channel Adapter interface
//! (§4.D), and the Reasoner Client (§4.M).

pub mod channel;
#[cfg(any(test, feature = "test-support"))]
mod fake_reasoner;
#[cfg(any(test, feature = "test-support"))]
mod fake_tool_client;
pub mod reasoner_client;
pub mod rpc_client;
pub mod scanner;
pub mod subprocess;

#[cfg(any(test, feature = "test-support"))]
pub use fake_reasoner::FakeReasonerClient;
#[cfg(any(test, feature = "test-support"))]
pub use fake_tool_client::FakeToolServerClient;
pub use reasoner_client::{HttpReasonerClient, ReasonerClient, ReasonerError};
pub use rpc_client::{RpcClient, RpcError, ToolCallOutcome, ToolServerClient};
pub use scanner::{FailMode, ScannerWrapper};
