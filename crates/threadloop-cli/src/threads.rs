//! Subcommands: `threadloop threads ...` and `threadloop config ...`.

use std::path::Path;

use anyhow::{Context, Result, bail};
use threadloop_agent::AgentSettings;

use crate::cli::{ConfigAction, ThreadAction};
use crate::helpers::open_thread_store;

pub async fn cmd_threads(config_path: &Path, action: ThreadAction) -> Result<()> {
    let settings = AgentSettings::load(config_path).context("failed to load settings")?;
    let profile = settings.active_profile();
    let store = open_thread_store(&profile).await?;

    match action {
        ThreadAction::List => {
            let ids = store.list().await.context("failed to list threads")?;
            if ids.is_empty() {
                println!("  No saved threads.");
            }
            for id in ids {
                println!("  {id}");
            }
        }
        ThreadAction::Show { id } => {
            let log = store
                .load(&id)
                .await
                .with_context(|| format!("failed to load thread `{id}`"))?;
            println!("  Thread {id} ({} messages)", log.len());
            println!();
            for msg in &log {
                println!("{}: {}", msg.role(), msg.content());
            }
        }
        ThreadAction::Delete { id } => {
            if store.delete(&id).await.context("failed to delete thread")? {
                println!("  Deleted thread {id}.");
            } else {
                bail!("thread `{id}` not found");
            }
        }
    }
    Ok(())
}

pub fn cmd_config(config_path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = AgentSettings::load(config_path).context("failed to load settings")?;
            print!("{}", settings.to_toml()?);
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            AgentSettings::default()
                .save(config_path)
                .context("failed to write settings")?;
            println!("  Wrote {}", config_path.display());
        }
    }
    Ok(())
}
