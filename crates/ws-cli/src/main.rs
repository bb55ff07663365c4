// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `ws`: a thin client for the workspace orchestrator daemon. Every
//! subcommand is a single round trip (or a subscribe-and-tail) over
//! the HTTP+WS transport — no storage or runtime access lives here.

mod client;
mod color;
mod commands;
mod exit_error;
mod output;
mod table;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};

use client::DaemonClient;
use commands::{project, workspace};
use exit_error::ExitError;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "ws", version, about = "Workspace orchestrator CLI")]
struct Cli {
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Workspace lifecycle, chat, and exec commands
    Workspace(workspace::WorkspaceArgs),
    /// Project branch listing and secrets
    Project(project::ProjectArgs),
}

#[tokio::main]
async fn main() {
    let matches = Cli::command().styles(color::styles()).get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    if let Err(err) = run(cli).await {
        match err.downcast::<ExitError>() {
            Ok(exit_error) => {
                eprintln!("{}", exit_error.message);
                std::process::exit(exit_error.code);
            }
            Err(err) => {
                eprintln!("{}: {err}", color::muted("error"));
                std::process::exit(1);
            }
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = DaemonClient::connect()?;
    match cli.command {
        Command::Workspace(args) => workspace::handle(args.command, &client, cli.format).await,
        Command::Project(args) => project::handle(args.command, &client, cli.format).await,
    }
}
