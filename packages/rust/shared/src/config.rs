//! Application configuration for QuestionHub.
//!
//! User config lives at `~/.questionhub/questionhub.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QuestionHubError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "questionhub.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".questionhub";

/// Job name of the answering task.
pub const ANSWER_JOB: &str = "tasks.answer_question";

/// Job name of the knowledge-graph refresh task.
pub const REFRESH_JOB: &str = "tasks.update_kg";

// ---------------------------------------------------------------------------
// Config structs (matching questionhub.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Job queue settings.
    #[serde(default)]
    pub queue: QueueConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the libSQL database holding questions, answer sets, and jobs.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Whether submissions rebuild the cache unless told otherwise.
    #[serde(default = "default_true")]
    pub rebuild_cache: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            rebuild_cache: true,
        }
    }
}

fn default_db_path() -> String {
    "var/questionhub.db".into()
}
fn default_true() -> bool {
    true
}

/// `[queue]` section: the job names the orchestrator submits and the
/// status aggregator recognizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Name of the "answer a question" job.
    #[serde(default = "default_answer_job")]
    pub answer_job: String,

    /// Name of the "refresh the knowledge graph" job.
    #[serde(default = "default_refresh_job")]
    pub refresh_job: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            answer_job: default_answer_job(),
            refresh_job: default_refresh_job(),
        }
    }
}

fn default_answer_job() -> String {
    ANSWER_JOB.into()
}
fn default_refresh_job() -> String {
    REFRESH_JOB.into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.questionhub/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| QuestionHubError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.questionhub/questionhub.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| QuestionHubError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        QuestionHubError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| QuestionHubError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| QuestionHubError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| QuestionHubError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configs the status aggregator could not classify unambiguously.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let queue = &config.queue;
    if queue.answer_job.is_empty() || queue.refresh_job.is_empty() {
        return Err(QuestionHubError::config("queue job names must not be empty"));
    }
    if queue.answer_job == queue.refresh_job {
        return Err(QuestionHubError::config(format!(
            "answer_job and refresh_job are both '{}'",
            queue.answer_job
        )));
    }
    Ok(())
}
