pub mod aggregate;
pub mod evaluation;
pub mod level;

pub use aggregate::{aggregate, aggregate_levels, aggregate_result, LevelTally, FALLBACK_LEVEL};
pub use evaluation::{AggregateResult, QuestionEvaluation};
pub use level::{CefrLevel, ParseLevelError};
