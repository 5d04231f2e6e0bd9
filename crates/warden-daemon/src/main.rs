// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wardend` — the multi-agent orchestration daemon. Owns every tool-server
//! and reasoner subprocess, polls registered channels, runs the scheduler,
//! and serves the control socket for `wardenctl`.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use warden_daemon::config::Config;
use warden_daemon::lifecycle::LifecycleError;
use warden_daemon::Daemon;

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to set up logging: {e}");
            std::process::exit(1);
        }
    };

    info!("starting wardend");

    let daemon = match Daemon::build(config).await {
        Ok(daemon) => Arc::new(daemon),
        Err(e) => {
            error!(error = %e, "failed to build daemon components");
            std::process::exit(1);
        }
    };

    let mut run_task = tokio::spawn(daemon.clone().run());

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            std::process::exit(1);
        }
    };

    // Borrow `run_task` in its own arm (rather than moving it) so the signal
    // arms can still await it afterwards for the daemon's actual exit result.
    tokio::select! {
        result = &mut run_task => {
            finish(result);
            return;
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
            daemon.request_shutdown();
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
            daemon.request_shutdown();
        }
    }

    finish(run_task.await);
}

fn finish(result: Result<Result<(), warden_daemon::DaemonError>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "daemon exited with an error");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "daemon task panicked");
            std::process::exit(1);
        }
    }
}

fn setup_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config.log_path.file_name().ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(non_blocking)).init();

    Ok(guard)
}
