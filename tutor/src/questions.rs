use crate::config::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

pub const DEFAULT_PLACEHOLDER: &str = "Type or speak your answer...";

/// An open-ended level-test question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            placeholder: default_placeholder(),
        }
    }
}

/// The five questions of the standard level test.
pub fn default_questions() -> Vec<Question> {
    [
        "Tell me about yourself. What are your hobbies and interests?",
        "Describe your typical day. What do you usually do from morning to evening?",
        "What is your favorite book or movie? Why do you like it?",
        "If you could travel anywhere in the world, where would you go and why?",
        "What are your goals for learning English? How do you plan to achieve them?",
    ]
    .into_iter()
    .enumerate()
    .map(|(index, text)| Question::new((index + 1).to_string(), text))
    .collect()
}

/// A set of questions loaded from TOML:
///
/// ```toml
/// [[questions]]
/// id = "1"
/// text = "Tell me about yourself."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionBank {
    pub questions: Vec<Question>,
}

impl Default for QuestionBank {
    fn default() -> Self {
        Self {
            questions: default_questions(),
        }
    }
}

impl QuestionBank {
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let bank: QuestionBank = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        bank.validate()?;

        info!(
            "Loaded {} questions from {}",
            bank.questions.len(),
            path.display()
        );
        Ok(bank)
    }

    /// Non-empty, with unique non-blank ids and non-blank texts.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.questions.is_empty() {
            return Err(ConfigError::Invalid {
                message: "question bank has no questions".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for question in &self.questions {
            if question.id.trim().is_empty() || question.text.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: "questions need a non-empty id and text".to_string(),
                });
            }
            if !seen.insert(question.id.as_str()) {
                return Err(ConfigError::Invalid {
                    message: format!("duplicate question id {:?}", question.id),
                });
            }
        }
        Ok(())
    }

    pub fn into_questions(self) -> Vec<Question> {
        self.questions
    }
}
