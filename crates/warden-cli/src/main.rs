// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wardenctl` - thin control-socket client for `wardend`.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use warden_daemon::protocol::{Request, Response};

#[derive(Parser)]
#[command(name = "wardenctl", version, about = "Operator CLI for the wardend daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the daemon is reachable
    Ping,
    /// Print uptime, agent states, tool/job/skill counts, and halted targets
    Status,
    /// Halt a target ("inngest", "channels", or "*" for everything)
    Halt {
        target: String,
    },
    /// Resume a previously halted target
    Resume {
        target: String,
    },
    /// List registered agents and their states
    Agents,
    /// List routed tools
    Tools,
    /// List loaded skills
    Skills,
    /// Request a graceful shutdown of the daemon
    Shutdown,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let request = match cli.command {
        Command::Ping => Request::Ping,
        Command::Status => Request::Status,
        Command::Halt { target } => Request::Halt { target },
        Command::Resume { target } => Request::Resume { target },
        Command::Agents => Request::Agents,
        Command::Tools => Request::Tools,
        Command::Skills => Request::Skills,
        Command::Shutdown => Request::Shutdown,
    };

    let response = client::send(request).await?;
    print_response(&response)?;

    if let Response::Error { message } = response {
        anyhow::bail!(message);
    }

    Ok(())
}

fn print_response(response: &Response) -> Result<()> {
    match response {
        Response::Pong => println!("pong"),
        Response::Ok => println!("ok"),
        Response::Error { message } => eprintln!("error: {message}"),
        Response::Status(report) => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        Response::AgentList(agents) => {
            println!("{}", serde_json::to_string_pretty(agents)?);
        }
        Response::ToolList(tools) => {
            println!("{}", serde_json::to_string_pretty(tools)?);
        }
        Response::SkillList(skills) => {
            println!("{}", serde_json::to_string_pretty(skills)?);
        }
    }
    Ok(())
}
