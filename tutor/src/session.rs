//! Level-test session
//!
//! Collects answers to a fixed set of questions, sends each non-blank answer
//! to an [`Examiner`], and aggregates whatever evaluations come back into one
//! overall level. A question whose evaluation fails is reported as skipped;
//! the rest of the test still counts.

use crate::examiner::{ExamResult, Examiner, LevelTestResult};
use crate::questions::Question;
use cefr::{aggregate_result, AggregateResult, QuestionEvaluation};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Please answer at least one question before submitting.")]
    NoAnswers,

    #[error("Unknown question id: {id}")]
    UnknownQuestion { id: String },

    #[error("A level test needs at least one question")]
    NoQuestions,

    #[error("Duplicate question id: {id}")]
    DuplicateQuestion { id: String },
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvaluationStrategy {
    /// One answer at a time, in question order
    #[default]
    Sequential,
    /// All answers at once, recorded as they complete
    Concurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedQuestion {
    pub question_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub result: AggregateResult,
    pub evaluations: Vec<QuestionEvaluation>,
    pub skipped: Vec<SkippedQuestion>,
}

impl SessionReport {
    /// Some answered questions could not be graded.
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

pub struct LevelTestSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    questions: Vec<Question>,
    answers: HashMap<String, String>,
    evaluations: Vec<QuestionEvaluation>,
}

impl LevelTestSession {
    /// Question ids key answers and evaluations, so they must be unique.
    pub fn new(questions: Vec<Question>) -> SessionResult<Self> {
        if questions.is_empty() {
            return Err(SessionError::NoQuestions);
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = questions.iter().find(|q| !seen.insert(q.id.as_str())) {
            return Err(SessionError::DuplicateQuestion {
                id: duplicate.id.clone(),
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            questions,
            answers: HashMap::new(),
            evaluations: Vec::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answer(&self, question_id: &str) -> Option<&str> {
        self.answers.get(question_id).map(String::as_str)
    }

    /// Evaluations in arrival order.
    pub fn evaluations(&self) -> &[QuestionEvaluation] {
        &self.evaluations
    }

    /// Store `text` as the answer to `question_id`, replacing any earlier
    /// answer. An evaluation of the earlier answer is discarded.
    pub fn record_answer(
        &mut self,
        question_id: &str,
        text: impl Into<String>,
    ) -> SessionResult<()> {
        if !self.questions.iter().any(|q| q.id == question_id) {
            return Err(SessionError::UnknownQuestion {
                id: question_id.to_string(),
            });
        }

        let text = text.into();
        if self.answers.get(question_id) != Some(&text) {
            self.evaluations.retain(|e| e.question_id != question_id);
        }
        self.answers.insert(question_id.to_string(), text);
        Ok(())
    }

    pub fn progress(&self) -> SessionProgress {
        let total = self.questions.len();
        let answered = self
            .questions
            .iter()
            .filter(|q| self.has_answer(&q.id))
            .count();
        SessionProgress {
            total,
            answered,
            remaining: total - answered,
            is_complete: answered == total,
        }
    }

    /// Keep `evaluation`, replacing any earlier one for the same question.
    pub fn record_evaluation(&mut self, evaluation: QuestionEvaluation) {
        match self
            .evaluations
            .iter_mut()
            .find(|e| e.question_id == evaluation.question_id)
        {
            Some(existing) => *existing = evaluation,
            None => self.evaluations.push(evaluation),
        }
    }

    /// Grade every non-blank answer and aggregate the results.
    pub async fn evaluate<E>(
        &mut self,
        examiner: &E,
        strategy: EvaluationStrategy,
    ) -> SessionResult<SessionReport>
    where
        E: Examiner + ?Sized,
    {
        let pending: Vec<(String, String)> = self
            .questions
            .iter()
            .filter_map(|q| {
                self.answers
                    .get(&q.id)
                    .filter(|answer| !answer.trim().is_empty())
                    .map(|answer| (q.id.clone(), answer.clone()))
            })
            .collect();

        if pending.is_empty() {
            return Err(SessionError::NoAnswers);
        }

        info!(
            "Session {}: evaluating {} answers ({:?})",
            self.id,
            pending.len(),
            strategy
        );

        let mut skipped = Vec::new();
        match strategy {
            EvaluationStrategy::Sequential => {
                for (question_id, answer) in pending {
                    let outcome = examiner.evaluate(&answer).await;
                    self.record_outcome(question_id, outcome, &mut skipped);
                }
            }
            EvaluationStrategy::Concurrent => {
                let limit = pending.len();
                let tasks = pending.into_iter().map(|(question_id, answer)| async move {
                    let outcome = examiner.evaluate(&answer).await;
                    (question_id, outcome)
                });

                let mut results = stream::iter(tasks).buffer_unordered(limit);
                while let Some((question_id, outcome)) = results.next().await {
                    self.record_outcome(question_id, outcome, &mut skipped);
                }
            }
        }

        let result = aggregate_result(&self.evaluations);
        info!(
            "Session {}: overall level {} from {} evaluations, {} skipped",
            self.id,
            result.level,
            self.evaluations.len(),
            skipped.len()
        );

        Ok(SessionReport {
            session_id: self.id,
            completed_at: Utc::now(),
            result,
            evaluations: self.evaluations.clone(),
            skipped,
        })
    }

    fn record_outcome(
        &mut self,
        question_id: String,
        outcome: ExamResult<LevelTestResult>,
        skipped: &mut Vec<SkippedQuestion>,
    ) {
        match outcome {
            Ok(graded) => {
                debug!("Question {} graded {}", question_id, graded.level);
                self.record_evaluation(QuestionEvaluation::new(
                    question_id,
                    graded.level,
                    graded.explanation,
                ));
            }
            Err(e) => {
                warn!("Skipping question {}: {}", question_id, e);
                self.evaluations.retain(|ev| ev.question_id != question_id);
                skipped.push(SkippedQuestion {
                    question_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn has_answer(&self, question_id: &str) -> bool {
        self.answers
            .get(question_id)
            .is_some_and(|answer| !answer.trim().is_empty())
    }
}
