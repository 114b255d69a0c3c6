//! CLI entry point for threadloop.
//!
//! This binary provides the `threadloop` command with subcommands for
//! chatting on a thread, managing saved threads and inspecting settings.

mod cli;
mod helpers;
mod repl;
mod threads;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::helpers::init_tracing;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            thread,
            recursion_limit,
            trace,
        } => {
            init_tracing("info");
            repl::cmd_chat(&cli.config, thread, recursion_limit, trace).await
        }
        Commands::Threads { action } => {
            init_tracing("warn");
            threads::cmd_threads(&cli.config, action).await
        }
        Commands::Config { action } => {
            init_tracing("warn");
            threads::cmd_config(&cli.config, action)
        }
    }
}
