// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Message-handling and scheduling layer: the Channel Manager, Message
//! Router, Slash-Command Handler, Dispatch Pipeline, and Scheduler.

mod channel_manager;
mod dispatch;
mod message_router;
mod scheduler;
mod slash_command;

pub use channel_manager::{ChannelManager, DEFAULT_MAX_MESSAGES_PER_CYCLE, DEFAULT_POLL_INTERVAL};
pub use dispatch::{DispatchContext, DispatchPipeline, CHANNELS_HALT_TARGET};
pub use message_router::MessageRouter;
pub use scheduler::{Scheduler, SchedulerContext, HALT_TARGET, TICK_INTERVAL};
pub use slash_command::{SlashCommandContext, SlashCommandHandler, SlashCommandOutcome};
