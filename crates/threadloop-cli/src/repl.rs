//! Subcommand: `threadloop chat` -- interactive REPL.
//!
//! Every turn streams `role: content` lines as the loop produces them and
//! saves the thread afterwards.

use std::io::{self, Write as _};
use std::path::Path;

use anyhow::{Context, Result};
use threadloop_agent::{AgentSettings, EventCallback};
use tracing::{info, warn};

use crate::helpers::build_orchestrator;

fn print_event(role: &str, content: &str) {
    println!("{role}: {content}");
}

/// Run the interactive chat loop on `thread_id`.
pub async fn cmd_chat(
    config_path: &Path,
    thread_id: String,
    recursion_limit: Option<u32>,
    show_trace: bool,
) -> Result<()> {
    threadloop_store::validate_thread_id(&thread_id)
        .with_context(|| format!("invalid thread id `{thread_id}`"))?;

    let settings = AgentSettings::load(config_path).context("failed to load settings")?;
    let profile = settings.active_profile();
    let orchestrator = build_orchestrator(&profile).await?;

    let resumed = orchestrator
        .memory()
        .load_if_saved(&thread_id)
        .await
        .context("failed to load saved thread")?;

    println!();
    println!("  threadloop v{}", env!("CARGO_PKG_VERSION"));
    println!("  Profile: {}", profile.name);
    println!("  Model: {}", profile.llm_model.model_name);
    println!("  Tools: {}", orchestrator.list_tools().join(", "));
    if resumed {
        let count = orchestrator.memory().messages(&thread_id).await.len();
        println!("  Thread: {thread_id} (resumed, {count} messages)");
    } else {
        println!("  Thread: {thread_id}");
    }
    println!("  Type your request, or 'quit' to exit.");
    println!();

    let on_event: &EventCallback<'_> = &print_event;
    let stdin = io::stdin();
    let mut line_buf = String::new();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        line_buf.clear();
        match stdin.read_line(&mut line_buf) {
            Ok(0) => {
                println!();
                info!("EOF received, exiting");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("  Error reading input: {e}");
                continue;
            }
        }

        let trimmed = line_buf.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            info!("user requested exit");
            break;
        }

        let result = orchestrator
            .invoke(&thread_id, trimmed, recursion_limit, Some(on_event))
            .await;
        if !result.ok {
            info!(error = ?result.error, "turn failed");
        }

        if let Err(e) = orchestrator.save_thread(&thread_id).await {
            warn!(error = %e, "failed to save thread");
        }

        if show_trace {
            for entry in orchestrator.tracer().get_logs(Some(&thread_id)) {
                println!("  {entry}");
            }
            orchestrator.tracer().clear_logs(Some(&thread_id));
        }
    }

    println!("  Goodbye!");
    Ok(())
}
