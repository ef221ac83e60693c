//! Reduction of per-question CEFR evaluations to one overall level.
//!
//! The overall level is the most frequent level among the evaluations. When
//! several levels share the highest count, the ordinal ranks of exactly those
//! tied levels are averaged and rounded half-up, and the level at that rank
//! wins. An empty evaluation list yields [`FALLBACK_LEVEL`].
//!
//! # Examples
//!
//! ```rust
//! use cefr::{aggregate, aggregate_levels, CefrLevel};
//!
//! // B1 and B2 tie: ranks 3 and 4 average to 3.5, which rounds up to B2.
//! assert_eq!(aggregate_levels([CefrLevel::B1, CefrLevel::B2]), CefrLevel::B2);
//! assert_eq!(aggregate(&[]), CefrLevel::B1);
//! ```

use crate::evaluation::{AggregateResult, QuestionEvaluation};
use crate::level::CefrLevel;

/// Level reported when there is nothing to aggregate.
pub const FALLBACK_LEVEL: CefrLevel = CefrLevel::B1;

/// Occurrence counts over the fixed six-level alphabet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelTally {
    counts: [usize; 6],
}

impl LevelTally {
    pub fn from_levels(levels: impl IntoIterator<Item = CefrLevel>) -> Self {
        let mut tally = Self::default();
        for level in levels {
            tally.add(level);
        }
        tally
    }

    pub fn add(&mut self, level: CefrLevel) {
        self.counts[Self::slot(level)] += 1;
    }

    pub fn count(&self, level: CefrLevel) -> usize {
        self.counts[Self::slot(level)]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Levels sharing the highest count, in canonical order. Empty when the
    /// tally is empty.
    pub fn modes(&self) -> Vec<CefrLevel> {
        let max = self.max_count();
        if max == 0 {
            return Vec::new();
        }
        CefrLevel::ALL
            .into_iter()
            .filter(|level| self.count(*level) == max)
            .collect()
    }

    /// The overall level for this tally.
    pub fn dominant(&self) -> CefrLevel {
        let modes = self.modes();
        match modes.as_slice() {
            [] => FALLBACK_LEVEL,
            [single] => *single,
            tied => {
                // First mode in canonical order; only used if the rounded
                // average ever falls off the scale.
                let first = tied[0];
                CefrLevel::from_rank(rounded_mean_rank(tied)).unwrap_or(first)
            }
        }
    }

    fn slot(level: CefrLevel) -> usize {
        usize::from(level.rank() - 1)
    }
}

/// Mean rank of `levels`, rounded half-up. Integer arithmetic keeps the
/// `.5` cases exact: round(sum / n) == floor((2 * sum + n) / (2 * n)).
fn rounded_mean_rank(levels: &[CefrLevel]) -> u8 {
    let n = levels.len() as u32;
    let sum: u32 = levels.iter().map(|level| u32::from(level.rank())).sum();
    ((2 * sum + n) / (2 * n)) as u8
}

/// Overall level for a list of evaluations.
///
/// The caller passes at most one evaluation per question; duplicates are
/// counted as given.
pub fn aggregate(evaluations: &[QuestionEvaluation]) -> CefrLevel {
    aggregate_levels(evaluations.iter().map(|evaluation| evaluation.level))
}

pub fn aggregate_levels(levels: impl IntoIterator<Item = CefrLevel>) -> CefrLevel {
    LevelTally::from_levels(levels).dominant()
}

/// Overall level paired with its summary text.
pub fn aggregate_result(evaluations: &[QuestionEvaluation]) -> AggregateResult {
    let level = aggregate(evaluations);
    AggregateResult {
        level,
        explanation: level.summary().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CefrLevel::*;

    fn evals(levels: &[CefrLevel]) -> Vec<QuestionEvaluation> {
        levels
            .iter()
            .enumerate()
            .map(|(i, level)| {
                QuestionEvaluation::new((i + 1).to_string(), *level, format!("Explanation {}", i + 1))
            })
            .collect()
    }

    #[test]
    fn test_empty_is_b1() {
        assert_eq!(aggregate(&[]), B1);
    }

    #[test]
    fn test_single_evaluation_is_its_level() {
        for level in CefrLevel::ALL {
            assert_eq!(aggregate(&evals(&[level])), level);
        }
    }

    #[test]
    fn test_clear_mode() {
        assert_eq!(aggregate(&evals(&[B1, B1, B2, A2])), B1);
    }

    #[test]
    fn test_all_same() {
        assert_eq!(aggregate(&evals(&[B2, B2, B2])), B2);
    }

    #[test]
    fn test_two_way_tie_rounds_half_up() {
        // 3 and 4 average to 3.5
        assert_eq!(aggregate(&evals(&[B1, B2])), B2);
    }

    #[test]
    fn test_three_way_tie() {
        // 1, 3, 5 average to exactly 3
        assert_eq!(aggregate(&evals(&[A1, B1, C1])), B1);
    }

    #[test]
    fn test_extremes_tie() {
        // 1 and 6 average to 3.5
        assert_eq!(aggregate(&evals(&[A1, C2])), B2);
    }

    #[test]
    fn test_tie_only_averages_tied_levels() {
        // A1 and C2 tie at two each; the single B1 takes no part in the average.
        assert_eq!(aggregate(&evals(&[A1, C2, A1, C2, B1])), B2);
        // A2 and B1 tie; C2 is a minority and must not pull the result up.
        assert_eq!(aggregate(&evals(&[A2, A2, B1, B1, C2])), B1);
    }

    #[test]
    fn test_order_independence() {
        let levels = [A2, C1, A2, C1, B2];
        let expected = aggregate(&evals(&levels));

        let mut rotated = levels;
        for _ in 0..levels.len() {
            rotated.rotate_left(1);
            assert_eq!(aggregate(&evals(&rotated)), expected);
        }

        let mut reversed = levels;
        reversed.reverse();
        assert_eq!(aggregate(&evals(&reversed)), expected);
    }

    #[test]
    fn test_result_is_stable_when_fed_back() {
        let cases: [&[CefrLevel]; 6] = [
            &[],
            &[C1],
            &[B1, B1, B2, A2],
            &[B1, B2],
            &[A1, B1, C1],
            &[A1, C2],
        ];
        for levels in cases {
            let overall = aggregate(&evals(levels));
            assert_eq!(aggregate(&evals(&[overall])), overall);
        }
    }

    #[test]
    fn test_every_pairwise_tie_lands_between_the_tied_levels() {
        for low in CefrLevel::ALL {
            for high in CefrLevel::ALL.into_iter().filter(|l| *l > low) {
                let overall = aggregate_levels([low, high]);
                assert!(overall >= low && overall <= high, "{low}/{high} -> {overall}");
            }
        }
    }

    #[test]
    fn test_tally_modes_in_canonical_order() {
        let tally = LevelTally::from_levels([C1, A1, C1, A1, B2]);
        assert_eq!(tally.total(), 5);
        assert_eq!(tally.max_count(), 2);
        assert_eq!(tally.count(B2), 1);
        assert_eq!(tally.count(C2), 0);
        assert_eq!(tally.modes(), vec![A1, C1]);
        assert!(LevelTally::default().modes().is_empty());
        assert!(LevelTally::default().is_empty());
    }

    #[test]
    fn test_rounded_mean_rank() {
        assert_eq!(rounded_mean_rank(&[B1, B2]), 4);
        assert_eq!(rounded_mean_rank(&[A1, B1, C1]), 3);
        assert_eq!(rounded_mean_rank(&[A1, A2]), 2);
        assert_eq!(rounded_mean_rank(&[A1, A2, B1, B2, C1, C2]), 4);
    }

    #[test]
    fn test_aggregate_result_carries_summary() {
        let result = aggregate_result(&evals(&[C1, C1, B2]));
        assert_eq!(result.level, C1);
        assert_eq!(result.explanation, C1.summary());

        let empty = aggregate_result(&[]);
        assert_eq!(empty.level, FALLBACK_LEVEL);
    }
}

#[cfg(kani)]
mod verification {
    use super::*;

    #[kani::proof]
    #[kani::unwind(8)]
    fn dominant_level_is_always_on_the_scale() {
        let counts: [usize; 6] = kani::any();
        for count in counts {
            kani::assume(count <= 4);
        }
        let tally = LevelTally { counts };
        let level = tally.dominant();
        assert!((1..=6).contains(&level.rank()));
        let modes = tally.modes();
        if let (Some(first), Some(last)) = (modes.first(), modes.last()) {
            assert!(level >= *first && level <= *last);
        }
    }
}
