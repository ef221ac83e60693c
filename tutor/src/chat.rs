//! Tutor chat
//!
//! Free conversation with a model playing an English tutor pitched at the
//! learner's level. The chat never fails on the model side: a failed or
//! empty reply becomes [`FALLBACK_REPLY`].

use crate::logging::preview;
use cefr::CefrLevel;
use model::{ChatRequest, ModelProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const FALLBACK_REPLY: &str = "Sorry, I am unavailable.";
pub const DEFAULT_TOPIC: &str = "general conversation";
pub const DEFAULT_LEVEL: CefrLevel = CefrLevel::A1;
pub const HISTORY_TURNS: usize = 5;

const REPLY_CUE: &str = "Tutor:";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Message is required and must not be empty")]
    EmptyMessage,

    #[error("Unknown chat topic: {0}")]
    UnknownTopic(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatTopic {
    #[serde(rename = "IT")]
    It,
    Study,
    Travel,
    #[serde(rename = "Daily life")]
    DailyLife,
    Rest,
}

impl ChatTopic {
    pub const ALL: [ChatTopic; 5] = [
        ChatTopic::It,
        ChatTopic::Study,
        ChatTopic::Travel,
        ChatTopic::DailyLife,
        ChatTopic::Rest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChatTopic::It => "IT",
            ChatTopic::Study => "Study",
            ChatTopic::Travel => "Travel",
            ChatTopic::DailyLife => "Daily life",
            ChatTopic::Rest => "Rest",
        }
    }
}

impl fmt::Display for ChatTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatTopic {
    type Err = ChatError;

    /// Case-insensitive; `daily-life` and `daily_life` also match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(['-', '_'], " ");
        ChatTopic::ALL
            .into_iter()
            .find(|topic| topic.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| ChatError::UnknownTopic(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub author: Author,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            author: Author::User,
            text: text.into(),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            author: Author::Bot,
            text: text.into(),
        }
    }
}

/// Tutor prompt: persona line, recent history, then the new message.
pub struct TutorPrompt;

impl TutorPrompt {
    pub fn build(
        message: &str,
        topic: Option<ChatTopic>,
        level: Option<CefrLevel>,
        history: &[ChatTurn],
    ) -> String {
        Self::build_with_window(message, topic, level, history, HISTORY_TURNS)
    }

    /// Like [`TutorPrompt::build`] with an explicit history window.
    pub fn build_with_window(
        message: &str,
        topic: Option<ChatTopic>,
        level: Option<CefrLevel>,
        history: &[ChatTurn],
        window: usize,
    ) -> String {
        let level = level.unwrap_or(DEFAULT_LEVEL);
        let topic = topic.map_or(DEFAULT_TOPIC, ChatTopic::as_str);

        let mut prompt = format!(
            "You are an English tutor for CEFR {} level students. Topic: {}. \
             Answer in simple English and correct errors gently.\n\n",
            level, topic
        );

        let recent = &history[history.len().saturating_sub(window)..];
        if !recent.is_empty() {
            prompt.push_str("Recent conversation:\n");
            for turn in recent {
                let speaker = match turn.author {
                    Author::User => "Student",
                    Author::Bot => "Tutor",
                };
                prompt.push_str(&format!("{}: {}\n", speaker, turn.text));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("Student: {}\n{}", message, REPLY_CUE));
        prompt
    }
}

/// Keep only the text after the last `Tutor:` marker.
pub fn clean_reply(reply: &str) -> &str {
    match reply.rfind(REPLY_CUE) {
        Some(index) => reply[index + REPLY_CUE.len()..].trim(),
        None => reply.trim(),
    }
}

pub struct Tutor<P> {
    provider: P,
    model: String,
    topic: Option<ChatTopic>,
    level: Option<CefrLevel>,
    timeout: Duration,
    history_turns: usize,
}

impl<P: ModelProvider> Tutor<P> {
    pub fn new(provider: P, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            topic: None,
            level: None,
            timeout: Duration::from_secs(30),
            history_turns: HISTORY_TURNS,
        }
    }

    pub fn with_topic(mut self, topic: ChatTopic) -> Self {
        self.topic = Some(topic);
        self
    }

    pub fn with_level(mut self, level: CefrLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn level(&self) -> CefrLevel {
        self.level.unwrap_or(DEFAULT_LEVEL)
    }

    pub fn topic(&self) -> Option<ChatTopic> {
        self.topic
    }

    /// Answer `message` in the context of `history`.
    pub async fn reply(&self, message: &str, history: &[ChatTurn]) -> ChatResult<String> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let prompt = TutorPrompt::build_with_window(
            message,
            self.topic,
            self.level,
            history,
            self.history_turns,
        );
        debug!("Tutor prompt: {}", preview(&prompt, 300));

        let request = ChatRequest::prompt(self.model.as_str(), prompt);
        let reply = match tokio::time::timeout(self.timeout, self.provider.chat(request)).await {
            Ok(Ok(response)) => response
                .first_content()
                .map(clean_reply)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            Ok(Err(e)) => {
                warn!("Tutor model call failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Tutor model call timed out after {:?}", self.timeout);
                None
            }
        };

        match reply {
            Some(text) => {
                info!("Tutor replied ({} chars)", text.chars().count());
                Ok(text)
            }
            None => {
                warn!("Using fallback tutor reply");
                Ok(FALLBACK_REPLY.to_string())
            }
        }
    }
}
