// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Tool Router (§4.C): the global `<server>_<tool>` namespace, destructive-
//! tool blocking, and per-agent tool filtering.

mod router;

pub use router::{RouteError, ToolRouter};
