// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connects to `wardend`'s control socket, sends one request, returns one
//! response. No auto-start, no restart, no cached state: every invocation
//! is a fresh connection.

use std::path::PathBuf;

use thiserror::Error;
use tokio::net::UnixStream;
use warden_daemon::protocol::{self, Request, Response, DEFAULT_TIMEOUT};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running (no socket at {0})")]
    NotRunning(PathBuf),
    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),
    #[error("could not determine state directory: {0}")]
    NoStateDir(#[from] warden_daemon::lifecycle::LifecycleError),
}

pub async fn send(request: Request) -> Result<Response, ClientError> {
    let state_dir = warden_daemon::env::state_dir()?;
    let socket_path = state_dir.join("control.sock");

    let mut stream = UnixStream::connect(&socket_path).await.map_err(|_| ClientError::NotRunning(socket_path))?;
    protocol::write_request(&mut stream, &request, DEFAULT_TIMEOUT).await?;
    let response = protocol::read_response(&mut stream, DEFAULT_TIMEOUT).await?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn send_without_a_running_daemon_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("WARDEN_STATE_DIR", dir.path());

        let result = send(Request::Ping).await;

        std::env::remove_var("WARDEN_STATE_DIR");
        assert!(matches!(result, Err(ClientError::NotRunning(_))));
    }
}
