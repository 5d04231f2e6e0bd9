// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel Manager (§4.E): polls every registered adapter on a fixed
//! interval and fans incoming messages out to a sequential handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use warden_adapters::channel::ChannelAdapter;
use warden_core::IncomingMessage;

pub const DEFAULT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);
pub const DEFAULT_MAX_MESSAGES_PER_CYCLE: usize = 50;

type OnMessage = Arc<dyn Fn(IncomingMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Runs the poll/dispatch cycle for every registered [`ChannelAdapter`].
/// Each adapter's failure is isolated; the manager never parallelizes
/// dispatch within a cycle so per-chat ordering is preserved.
pub struct ChannelManager {
    adapters: RwLock<Vec<Arc<dyn ChannelAdapter>>>,
    poll_interval: std::time::Duration,
    max_messages_per_cycle: usize,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    stop: Arc<Notify>,
}

impl ChannelManager {
    pub fn new(poll_interval: std::time::Duration, max_messages_per_cycle: usize) -> Self {
        Self {
            adapters: RwLock::new(Vec::new()),
            poll_interval,
            max_messages_per_cycle,
            handle: parking_lot::Mutex::new(None),
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn register(&self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.write().push(adapter);
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// No-op if already running.
    pub fn start(self: &Arc<Self>, on_message: OnMessage) {
        if self.handle.lock().is_some() {
            return;
        }
        let this = self.clone();
        let stop = self.stop.clone();
        let task = tokio::spawn(async move {
            loop {
                this.run_cycle(&on_message).await;
                tokio::select! {
                    _ = tokio::time::sleep(this.poll_interval) => {}
                    _ = stop.notified() => break,
                }
            }
        });
        *self.handle.lock() = Some(task);
    }

    pub async fn run_cycle(&self, on_message: &OnMessage) {
        let adapters: Vec<Arc<dyn ChannelAdapter>> = self.adapters.read().clone();
        for adapter in adapters {
            let messages = match adapter.poll().await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(channel = adapter.channel(), error = %e, "channel poll failed");
                    continue;
                }
            };
            for message in messages.into_iter().take(self.max_messages_per_cycle) {
                on_message(message).await;
            }
        }
    }

    /// Idempotent: cancels the timer and shuts down every adapter.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            self.stop.notify_one();
            let _ = handle.await;
        }
        let adapters: Vec<Arc<dyn ChannelAdapter>> = self.adapters.read().clone();
        for adapter in adapters {
            let _ = adapter.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use warden_adapters::FakeChannelAdapter;

    #[tokio::test]
    async fn run_cycle_dispatches_in_poll_order() {
        let manager = ChannelManager::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_MESSAGES_PER_CYCLE);
        let adapter = Arc::new(FakeChannelAdapter::new("telegram"));
        adapter.push_incoming("c1", "u1", "first");
        adapter.push_incoming("c1", "u1", "second");
        manager.register(adapter);

        let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let received_for_closure = received.clone();
        let on_message: OnMessage = Arc::new(move |msg: IncomingMessage| {
            let received = received_for_closure.clone();
            Box::pin(async move { received.lock().push(msg.text) })
        });

        manager.run_cycle(&on_message).await;
        assert_eq!(*received.lock(), vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn run_cycle_caps_messages_per_adapter() {
        let manager = ChannelManager::new(DEFAULT_POLL_INTERVAL, 1);
        let adapter = Arc::new(FakeChannelAdapter::new("telegram"));
        adapter.push_incoming("c1", "u1", "first");
        adapter.push_incoming("c1", "u1", "second");
        manager.register(adapter);

        let count = Arc::new(Mutex::new(0usize));
        let count_for_closure = count.clone();
        let on_message: OnMessage = Arc::new(move |_msg: IncomingMessage| {
            let count = count_for_closure.clone();
            Box::pin(async move { *count.lock() += 1 })
        });

        manager.run_cycle(&on_message).await;
        assert_eq!(*count.lock(), 1);
    }
}
