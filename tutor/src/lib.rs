pub mod chat;
pub mod config;
pub mod examiner;
pub mod logging;
pub mod questions;
pub mod session;

pub use chat::{Author, ChatError, ChatResult, ChatTopic, ChatTurn, Tutor, TutorPrompt};
pub use config::{ChatConfig, ConfigError, ConfigResult, TutorConfig};
pub use examiner::{
    EvaluationPrompt, ExamError, ExamResult, Examiner, ExaminerConfig, LevelTestResult,
    LlmExaminer,
};
pub use logging::init_tracing;
pub use questions::{default_questions, Question, QuestionBank};
pub use session::{
    EvaluationStrategy, LevelTestSession, SessionError, SessionProgress, SessionReport,
    SessionResult, SkippedQuestion,
};
