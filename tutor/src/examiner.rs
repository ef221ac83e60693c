//! Answer examiner
//!
//! Grades one free-text answer on the CEFR scale by prompting a language
//! model for strict JSON and validating the reply. A reply is only accepted
//! when it carries both a `level` from the six-level scale and a non-empty
//! `explanation`; everything else surfaces as an [`ExamError`] so callers
//! can drop that answer and carry on.
//!
//! Models do not always honour "strict JSON", so the reply is searched in
//! three passes:
//!
//! 1. the whole reply as a JSON object
//! 2. each flat `{...}` span mentioning `"level"` then `"explanation"`
//! 3. each flat `{...}` span of any shape
//!
//! # Example
//!
//! ```rust,no_run
//! use model::OllamaProvider;
//! use tutor::examiner::{Examiner, ExaminerConfig, LlmExaminer};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OllamaProvider::with_default_config()?;
//! let examiner = LlmExaminer::new(provider, ExaminerConfig::default());
//!
//! let result = examiner
//!     .evaluate("I like to read books and watch movies in English.")
//!     .await?;
//! println!("{}: {}", result.level, result.explanation);
//! # Ok(())
//! # }
//! ```

use crate::logging::preview;
use async_trait::async_trait;
use cefr::CefrLevel;
use model::{ChatRequest, ModelError, ModelProvider, RetryPolicy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Explanation attached to lenient-mode fallback results.
pub const FALLBACK_EXPLANATION: &str = "Fallback due to parse error";

const RESPONSE_CUE: &str = "JSON response:";

#[derive(Error, Debug)]
pub enum ExamError {
    #[error("Answer is required and must not be empty")]
    EmptyAnswer,

    #[error("Request timeout: examiner did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Invalid response format: {message}")]
    MalformedResponse { message: String },

    #[error("Invalid CEFR level: {label}")]
    InvalidLevel { label: String },
}

impl ExamError {
    /// Timeouts and transient transport failures are worth another attempt;
    /// a reply that was received but is unusable is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExamError::Timeout(_) => true,
            ExamError::Model(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The model answered, but nothing gradable came back.
    pub fn is_unusable_reply(&self) -> bool {
        matches!(
            self,
            ExamError::MalformedResponse { .. } | ExamError::InvalidLevel { .. }
        )
    }

    fn malformed(message: impl Into<String>) -> Self {
        ExamError::MalformedResponse {
            message: message.into(),
        }
    }
}

pub type ExamResult<T> = Result<T, ExamError>;

/// A graded answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTestResult {
    pub level: CefrLevel,
    pub explanation: String,
}

/// Grades a single free-text answer.
#[async_trait]
pub trait Examiner: Send + Sync {
    async fn evaluate(&self, answer: &str) -> ExamResult<LevelTestResult>;
}

#[async_trait]
impl<E: Examiner + ?Sized> Examiner for Box<E> {
    async fn evaluate(&self, answer: &str) -> ExamResult<LevelTestResult> {
        (**self).evaluate(answer).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExaminerConfig {
    /// Model used for grading
    pub model: String,
    /// Upper bound for a single model call, in seconds
    pub timeout_secs: u64,
    /// Sampling temperature override for grading calls
    pub temperature: Option<f32>,
    /// Backoff for timeouts and transient transport failures
    pub retry: RetryPolicy,
    /// When set, unusable replies grade as this level instead of failing
    pub fallback_level: Option<CefrLevel>,
}

impl Default for ExaminerConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1:8b".to_string(),
            timeout_secs: 30,
            temperature: None,
            retry: RetryPolicy::default(),
            fallback_level: None,
        }
    }
}

impl ExaminerConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_fallback_level(mut self, level: CefrLevel) -> Self {
        self.fallback_level = Some(level);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Grading prompt sent to the model for one answer.
pub struct EvaluationPrompt;

impl EvaluationPrompt {
    pub fn build(answer: &str) -> String {
        format!(
            "You are an English examiner. Rate the following answer on CEFR A1–C2 and explain briefly. \
             Return STRICT JSON: {{ \"level\": \"A1\"|\"A2\"|\"B1\"|\"B2\"|\"C1\"|\"C2\", \"explanation\": \"string\" }}.\n\n\
             Answer to evaluate:\n{}\n\n{}",
            answer, RESPONSE_CUE
        )
    }
}

/// [`Examiner`] backed by a [`ModelProvider`].
pub struct LlmExaminer<P> {
    provider: P,
    config: ExaminerConfig,
}

impl<P: ModelProvider> LlmExaminer<P> {
    pub fn new(provider: P, config: ExaminerConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &ExaminerConfig {
        &self.config
    }

    async fn ask(&self, prompt: String) -> ExamResult<String> {
        let mut request = ChatRequest::prompt(self.config.model.as_str(), prompt);
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }

        let timeout = self.config.timeout();
        let provider = &self.provider;
        let request = &request;

        let response = self
            .config
            .retry
            .run(
                move || async move {
                    match tokio::time::timeout(timeout, provider.chat(request.clone())).await {
                        Ok(result) => result.map_err(ExamError::from),
                        Err(_) => Err(ExamError::Timeout(timeout)),
                    }
                },
                ExamError::is_retryable,
            )
            .await?;

        response
            .first_content()
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ExamError::malformed("Empty response from model"))
    }
}

#[async_trait]
impl<P: ModelProvider> Examiner for LlmExaminer<P> {
    async fn evaluate(&self, answer: &str) -> ExamResult<LevelTestResult> {
        if answer.trim().is_empty() {
            return Err(ExamError::EmptyAnswer);
        }

        let started = Instant::now();
        info!(
            "Evaluating answer ({} chars) with {}",
            answer.chars().count(),
            self.provider.provider_name()
        );
        debug!("Answer preview: {}", preview(answer, 100));

        let graded = self
            .ask(EvaluationPrompt::build(answer))
            .await
            .and_then(|reply| {
                debug!("Examiner reply: {}", preview(&reply, 200));
                parse_evaluation(strip_echoed_prompt(&reply))
            });

        match graded {
            Ok(result) => {
                info!(
                    "Answer graded {} in {}ms",
                    result.level,
                    started.elapsed().as_millis()
                );
                Ok(result)
            }
            Err(e) => match self.config.fallback_level {
                Some(level) if e.is_unusable_reply() => {
                    warn!("Unusable examiner reply, falling back to {}: {}", level, e);
                    Ok(LevelTestResult {
                        level,
                        explanation: FALLBACK_EXPLANATION.to_string(),
                    })
                }
                _ => {
                    warn!("Evaluation failed: {}", e);
                    Err(e)
                }
            },
        }
    }
}

/// Drop an echoed prompt: keep only what follows the last response cue.
pub fn strip_echoed_prompt(reply: &str) -> &str {
    match reply.rfind(RESPONSE_CUE) {
        Some(index) => reply[index + RESPONSE_CUE.len()..].trim(),
        None => reply.trim(),
    }
}

/// Extract a graded result from a model reply.
pub fn parse_evaluation(text: &str) -> ExamResult<LevelTestResult> {
    let mut last_error = ExamError::malformed("no JSON object found in reply");

    for candidate in json_candidates(text) {
        let Ok(value) = serde_json::from_str::<Value>(candidate) else {
            continue;
        };
        match fields_of(&value) {
            Ok((label, explanation)) => {
                let level = label
                    .parse::<CefrLevel>()
                    .map_err(|e| ExamError::InvalidLevel { label: e.label })?;
                return Ok(LevelTestResult {
                    level,
                    explanation: explanation.to_string(),
                });
            }
            Err(e) => last_error = e,
        }
    }

    Err(last_error)
}

fn json_candidates(text: &str) -> Vec<&str> {
    static KEYED_OBJECT: OnceLock<Regex> = OnceLock::new();
    static ANY_OBJECT: OnceLock<Regex> = OnceLock::new();

    let keyed = KEYED_OBJECT.get_or_init(|| {
        Regex::new(r#"\{[^{}]*?"level"[^{}]*?"explanation"[^{}]*?\}"#).expect("valid regex")
    });
    let any = ANY_OBJECT.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("valid regex"));

    let mut candidates = vec![text.trim()];
    candidates.extend(keyed.find_iter(text).map(|m| m.as_str()));
    candidates.extend(any.find_iter(text).map(|m| m.as_str()));
    candidates
}

fn fields_of(value: &Value) -> ExamResult<(&str, &str)> {
    let non_empty = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    match (non_empty("level"), non_empty("explanation")) {
        (Some(level), Some(explanation)) => Ok((level, explanation)),
        _ => Err(ExamError::malformed("missing level or explanation")),
    }
}
