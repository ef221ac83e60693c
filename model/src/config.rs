//! Connection and sampling settings for the Ollama provider.
//!
//! The sampling defaults are the ones the level examiner and the tutor are
//! tuned for: moderately creative replies, short enough to stay a single
//! JSON object or a few sentences. Any request can still override them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Sampling parameters sent with every request that does not set its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
    /// Upper bound on generated tokens; `None` leaves it to the server
    pub max_tokens: Option<u32>,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: Some(250),
        }
    }
}

impl Sampling {
    fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            ));
        }
        if !(0.0..=1.0).contains(&self.top_p) || self.top_p == 0.0 {
            return Err(format!("top_p must be within (0.0, 1.0], got {}", self.top_p));
        }
        if self.max_tokens == Some(0) {
            return Err("max_tokens must be positive when set".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Server address; an OpenAI-style `/v1` suffix is accepted and dropped
    pub base_url: String,
    /// Per-request HTTP timeout, in seconds
    pub timeout_secs: u64,
    pub sampling: Sampling,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            sampling: Sampling::default(),
        }
    }
}

impl OllamaConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Root of the Ollama HTTP API, always ending in `/`, port included.
    pub fn api_root(&self) -> Result<String, String> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix("/v1").unwrap_or(trimmed);

        let url = reqwest::Url::parse(trimmed)
            .map_err(|e| format!("invalid base URL {:?}: {}", self.base_url, e))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(format!(
                "base URL must be an http(s) address, got {:?}",
                self.base_url
            ));
        }

        let mut root = url.to_string();
        if !root.ends_with('/') {
            root.push('/');
        }
        Ok(root)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.api_root()?;
        self.sampling.validate()?;
        if self.timeout_secs == 0 {
            return Err("timeout must be at least one second".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tutor_tuning() {
        let config = OllamaConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.sampling.temperature, 0.7);
        assert_eq!(config.sampling.top_p, 0.9);
        assert_eq!(config.sampling.max_tokens, Some(250));
        assert_eq!(config.api_root().unwrap(), "http://localhost:11434/");
    }

    #[test]
    fn test_api_root_keeps_custom_port() {
        let config = OllamaConfig::default().with_base_url("http://127.0.0.1:40887");
        assert_eq!(config.api_root().unwrap(), "http://127.0.0.1:40887/");
    }

    #[test]
    fn test_api_root_drops_v1_and_trailing_slash() {
        for url in [
            "http://ollama.internal:11434/v1",
            "http://ollama.internal:11434/v1/",
            "http://ollama.internal:11434/",
        ] {
            let config = OllamaConfig::default().with_base_url(url);
            assert_eq!(config.api_root().unwrap(), "http://ollama.internal:11434/");
        }

        let proxied = OllamaConfig::default().with_base_url("https://gateway.example.com/ollama");
        assert_eq!(
            proxied.api_root().unwrap(),
            "https://gateway.example.com/ollama/"
        );
    }

    #[test]
    fn test_rejects_unusable_addresses() {
        for url in ["", "localhost:11434", "ftp://files.example.com"] {
            let config = OllamaConfig::default().with_base_url(url);
            assert!(config.validate().is_err(), "accepted {:?}", url);
        }
    }

    #[test]
    fn test_rejects_out_of_range_sampling() {
        let hot = Sampling {
            temperature: 2.5,
            ..Sampling::default()
        };
        assert!(OllamaConfig::default().with_sampling(hot).validate().is_err());

        let no_top_p = Sampling {
            top_p: 0.0,
            ..Sampling::default()
        };
        assert!(OllamaConfig::default()
            .with_sampling(no_top_p)
            .validate()
            .is_err());

        let silent = Sampling {
            max_tokens: Some(0),
            ..Sampling::default()
        };
        assert!(OllamaConfig::default()
            .with_sampling(silent)
            .validate()
            .is_err());

        let unbounded = Sampling {
            max_tokens: None,
            ..Sampling::default()
        };
        assert!(OllamaConfig::default()
            .with_sampling(unbounded)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = OllamaConfig::default().with_timeout(Duration::from_millis(500));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_table_keeps_defaults() {
        let config: OllamaConfig = serde_json::from_str(
            r#"{"base_url": "http://10.0.0.2:11434", "sampling": {"temperature": 0.2}}"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://10.0.0.2:11434");
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.sampling.temperature, 0.2);
        assert_eq!(config.sampling.top_p, 0.9);
    }
}
