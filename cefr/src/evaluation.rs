use crate::level::CefrLevel;
use serde::{Deserialize, Serialize};

/// One graded answer, attributed to the question it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEvaluation {
    pub question_id: String,
    pub level: CefrLevel,
    pub explanation: String,
}

impl QuestionEvaluation {
    pub fn new(
        question_id: impl Into<String>,
        level: CefrLevel,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            level,
            explanation: explanation.into(),
        }
    }
}

/// The overall outcome of a full test session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub level: CefrLevel,
    pub explanation: String,
}
