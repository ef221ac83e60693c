//! Runtime configuration for the tutor binary.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. Command-line flags are applied last by the binary.

use crate::examiner::ExaminerConfig;
use model::OllamaConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const ENV_MODEL: &str = "TUTOR_MODEL";
pub const ENV_BASE_URL: &str = "OLLAMA_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "TUTOR_TIMEOUT_SECS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tutor chat settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Upper bound for a single tutor reply, in seconds
    pub timeout_secs: u64,
    /// Number of previous turns included in the prompt
    pub history_turns: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            history_turns: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    pub provider: OllamaConfig,
    pub examiner: ExaminerConfig,
    pub chat: ChatConfig,
    /// Question bank replacing the built-in questions
    pub questions_file: Option<PathBuf>,
}

impl TutorConfig {
    /// Defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        if let Ok(model) = std::env::var(ENV_MODEL) {
            debug!("{} overrides model: {}", ENV_MODEL, model);
            self.set_model(model);
        }

        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            debug!("{} overrides base URL: {}", ENV_BASE_URL, base_url);
            self.provider.base_url = base_url;
        }

        if let Ok(raw) = std::env::var(ENV_TIMEOUT_SECS) {
            let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                message: format!(
                    "{} must be a whole number of seconds, got {:?}",
                    ENV_TIMEOUT_SECS, raw
                ),
            })?;
            self.set_timeout(Duration::from_secs(secs));
        }

        Ok(())
    }

    /// Model used for both grading and chat.
    pub fn model(&self) -> &str {
        &self.examiner.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.examiner.model = model.into();
    }

    /// Applies one timeout to the provider, the examiner and the tutor.
    pub fn set_timeout(&mut self, timeout: Duration) {
        let secs = timeout.as_secs();
        self.provider.timeout_secs = secs;
        self.examiner.timeout_secs = secs;
        self.chat.timeout_secs = secs;
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.provider
            .validate()
            .map_err(|message| ConfigError::Invalid { message })?;

        if self.examiner.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "model name must not be empty".to_string(),
            });
        }
        if self.examiner.timeout_secs == 0 || self.chat.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "timeouts must be at least one second".to_string(),
            });
        }
        Ok(())
    }
}
