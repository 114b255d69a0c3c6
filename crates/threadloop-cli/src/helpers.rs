//! Shared setup: tracing, persistence and orchestrator construction.

use std::sync::Arc;

use anyhow::{Context, Result};
use threadloop_agent::{
    AgentOrchestrator, LlmClient, ModelClient, PersistenceBackend, Profile, Summarizer,
    ThreadMemoryStore,
};
use threadloop_store::{Database, JsonFileStore, SqliteThreadStore, ThreadLogStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// SQLite file name inside the profile's data directory.
const SQLITE_FILE: &str = "threads.db";

/// Initialize the tracing subscriber.  `RUST_LOG` overrides `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Open the persistence backend selected by the profile.
pub async fn open_thread_store(profile: &Profile) -> Result<Arc<dyn ThreadLogStore>> {
    let dir = profile.data_dir.clone();
    match profile.persistence {
        PersistenceBackend::Json => {
            let store = JsonFileStore::open(&dir)
                .with_context(|| format!("failed to open thread directory {}", dir.display()))?;
            info!(path = %dir.display(), "json thread store ready");
            Ok(Arc::new(store))
        }
        PersistenceBackend::Sqlite => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let path = dir.join(SQLITE_FILE);
            let db = Database::open_and_migrate(path.clone())
                .await
                .with_context(|| format!("failed to open database {}", path.display()))?;
            info!(path = %path.display(), "sqlite thread store ready");
            Ok(Arc::new(SqliteThreadStore::new(db)))
        }
    }
}

/// Build the orchestrator for a profile, with the built-in tools rooted at
/// the current directory.
pub async fn build_orchestrator(profile: &Profile) -> Result<AgentOrchestrator> {
    let llm_config = profile
        .llm_model
        .client_config()
        .context("invalid llm_model settings")?;
    let model: Arc<dyn ModelClient> =
        Arc::new(LlmClient::new(llm_config).context("failed to create LLM client")?);

    let summary_config = profile
        .summary_model
        .client_config()
        .context("invalid summary_model settings")?;
    let summary_model: Arc<dyn ModelClient> = Arc::new(
        LlmClient::new(summary_config).context("failed to create summary LLM client")?,
    );

    let store = open_thread_store(profile).await?;
    let memory = ThreadMemoryStore::new(
        profile.memory_config(),
        Summarizer::new(summary_model, profile.summary_model.model_name.as_str()),
    )
    .with_persistence(store);

    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let orchestrator =
        AgentOrchestrator::new(model, Arc::new(memory), profile.orchestrator_config())
            .with_tools(threadloop_adapters::builtin_tools(cwd));

    info!(
        profile = %profile.name,
        model = %profile.llm_model.model_name,
        tools = ?orchestrator.list_tools(),
        "orchestrator ready"
    );
    Ok(orchestrator)
}
