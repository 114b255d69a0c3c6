//! Profile-based TOML configuration.
//!
//! ```toml
//! active = "dev"
//!
//! [[profiles]]
//! name = "dev"
//! max_history_size = 4096
//! recursion_limit = 10
//! persistence = "json"
//! data_dir = "data/memory"
//!
//! [profiles.llm_model]
//! model_name = "gpt-4o-mini"
//! provider = "openai"
//!
//! [profiles.summary_model]
//! model_name = "gpt-4o-mini"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AgentError, Result};
use crate::llm::client::LlmClientConfig;
use crate::memory::MemoryConfig;
use crate::orchestrator::OrchestratorConfig;

/// Environment variables consulted, in order, when no API key is configured.
pub const API_KEY_ENV_VARS: [&str; 2] = ["THREADLOOP_API_KEY", "OPENAI_API_KEY"];

const DEFAULT_PROFILE: &str = "dev";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

// ---------------------------------------------------------------------------
// Model settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model_name: String,
    /// `openai`, `ollama` or `openai-compatible`.
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_owned(),
            provider: "openai".to_owned(),
            base_url: None,
            api_key: None,
            temperature: 0.0,
        }
    }
}

impl ModelSettings {
    /// Client configuration, resolving the API key from the environment
    /// when the file does not carry one.
    pub fn client_config(&self) -> Result<LlmClientConfig> {
        self.client_config_with(|var| std::env::var(var).ok())
    }

    /// Like [`client_config`](Self::client_config) with an explicit
    /// environment lookup.
    pub fn client_config_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<LlmClientConfig> {
        let base_url = match self.provider.as_str() {
            "openai" => self.base_url.as_deref().unwrap_or(OPENAI_BASE_URL),
            "ollama" => self.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL),
            "openai-compatible" => {
                self.base_url
                    .as_deref()
                    .ok_or_else(|| AgentError::ConfigError {
                        reason: format!(
                            "model `{}` uses provider `openai-compatible` but has no base_url",
                            self.model_name
                        ),
                    })?
            }
            other => {
                return Err(AgentError::UnsupportedProvider {
                    provider: other.to_owned(),
                });
            }
        };

        let api_key = resolve_api_key(self.api_key.as_deref(), env).unwrap_or_default();
        Ok(LlmClientConfig::openai_compatible(
            api_key,
            self.model_name.as_str(),
            base_url,
        ))
    }
}

/// The configured key if non-empty, otherwise the first set variable in
/// [`API_KEY_ENV_VARS`].
pub fn resolve_api_key(
    configured: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    if let Some(key) = configured.filter(|k| !k.is_empty()) {
        return Some(key.to_owned());
    }
    API_KEY_ENV_VARS
        .iter()
        .find_map(|var| env(var).filter(|v| !v.is_empty()))
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    #[default]
    Json,
    Sqlite,
}

/// One named set of runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub max_history_size: usize,
    pub recursion_limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub data_dir: PathBuf,
    pub persistence: PersistenceBackend,
    pub llm_model: ModelSettings,
    pub summary_model: ModelSettings,
}

impl Default for Profile {
    fn default() -> Self {
        Self::named(DEFAULT_PROFILE)
    }
}

impl Profile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_history_size: 4096,
            recursion_limit: 10,
            system_prompt: None,
            data_dir: PathBuf::from("data/memory"),
            persistence: PersistenceBackend::Json,
            llm_model: ModelSettings::default(),
            summary_model: ModelSettings::default(),
        }
    }

    pub fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            max_history_size: self.max_history_size,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            system_prompt: self.system_prompt.clone(),
            recursion_limit: self.recursion_limit,
            model: self.llm_model.model_name.clone(),
            temperature: Some(self.llm_model.temperature),
            max_tokens: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

/// Top-level settings: the active profile name plus all profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub active: String,
    pub profiles: Vec<Profile>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            active: DEFAULT_PROFILE.to_owned(),
            profiles: vec![Profile::default()],
        }
    }
}

impl AgentSettings {
    /// Load settings from `path`, writing defaults there first if the file is
    /// missing or empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(AgentError::ConfigError {
                    reason: format!("failed to read {}: {e}", path.display()),
                });
            }
        };

        if content.trim().is_empty() {
            warn!(path = %path.display(), "configuration missing, writing defaults");
            let settings = Self::default();
            settings.save(path)?;
            return Ok(settings);
        }

        let settings: Self = toml::from_str(&content).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?;

        info!(path = %path.display(), active = %settings.active, "configuration loaded");
        Ok(settings)
    }

    /// Write settings to `path` as pretty TOML, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = self.to_toml()?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| AgentError::ConfigError {
                reason: format!("failed to create {}: {e}", parent.display()),
            })?;
        }

        std::fs::write(path, content).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to write {}: {e}", path.display()),
        })?;

        info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to serialize configuration: {e}"),
        })
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// The active profile, or a default profile carrying the active name.
    pub fn active_profile(&self) -> Profile {
        self.profile(&self.active)
            .cloned()
            .unwrap_or_else(|| Profile::named(self.active.as_str()))
    }
}
