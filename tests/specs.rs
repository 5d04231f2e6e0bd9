//! Behavioral specifications for the warden runtime.
//!
//! These tests are black-box: they spawn the real `wardend`/`wardenctl`
//! binaries against an isolated state directory and verify control-socket
//! behavior end to end.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/daemon/lifecycle.rs"]
mod daemon_lifecycle;
#[path = "specs/daemon/halt_resume.rs"]
mod daemon_halt_resume;
#[path = "specs/daemon/control_socket.rs"]
mod daemon_control_socket;

#[path = "specs/cli/errors.rs"]
mod cli_errors;
