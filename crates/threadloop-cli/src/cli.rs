//! CLI argument definitions for threadloop.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// threadloop -- a tool-using conversational agent.
#[derive(Parser)]
#[command(
    name = "threadloop",
    version,
    about = "threadloop -- tool-using conversational agent",
    long_about = "Chat with a language model that can list, read and write files and run \
                  shell commands. Conversations are kept per thread and saved between runs."
)]
pub struct Cli {
    /// Path to the TOML settings file.
    #[arg(long, global = true, default_value = "threadloop.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat on a thread.
    Chat {
        /// Thread to resume or create.
        #[arg(long, short, default_value = "1")]
        thread: String,

        /// Override the profile's loop bound for every turn.
        #[arg(long)]
        recursion_limit: Option<u32>,

        /// Print the call trace after each turn.
        #[arg(long)]
        trace: bool,
    },

    /// Manage saved threads.
    Threads {
        #[command(subcommand)]
        action: ThreadAction,
    },

    /// Inspect or create the settings file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ThreadAction {
    /// List saved thread ids.
    List,

    /// Print a saved thread.
    Show {
        /// Thread id.
        id: String,
    },

    /// Delete a saved thread.
    Delete {
        /// Thread id.
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective settings.
    Show,

    /// Write a default settings file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_defaults() {
        let cli = Cli::parse_from(["threadloop", "chat"]);
        assert_eq!(cli.config, PathBuf::from("threadloop.toml"));
        match cli.command {
            Commands::Chat {
                thread,
                recursion_limit,
                trace,
            } => {
                assert_eq!(thread, "1");
                assert_eq!(recursion_limit, None);
                assert!(!trace);
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn global_config_after_subcommand() {
        let cli = Cli::parse_from(["threadloop", "threads", "show", "t1", "--config", "x.toml"]);
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert!(matches!(
            cli.command,
            Commands::Threads {
                action: ThreadAction::Show { .. }
            }
        ));
    }
}
