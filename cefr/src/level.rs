use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid CEFR level: {label}")]
pub struct ParseLevelError {
    pub label: String,
}

/// A level on the six-point CEFR scale, lowest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum CefrLevel {
    A1,
    A2,
    #[default]
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    /// All levels in canonical order (A1 through C2).
    pub const ALL: [CefrLevel; 6] = [
        CefrLevel::A1,
        CefrLevel::A2,
        CefrLevel::B1,
        CefrLevel::B2,
        CefrLevel::C1,
        CefrLevel::C2,
    ];

    /// Ordinal rank on the scale, A1 = 1 through C2 = 6.
    pub fn rank(self) -> u8 {
        match self {
            CefrLevel::A1 => 1,
            CefrLevel::A2 => 2,
            CefrLevel::B1 => 3,
            CefrLevel::B2 => 4,
            CefrLevel::C1 => 5,
            CefrLevel::C2 => 6,
        }
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            1 => Some(CefrLevel::A1),
            2 => Some(CefrLevel::A2),
            3 => Some(CefrLevel::B1),
            4 => Some(CefrLevel::B2),
            5 => Some(CefrLevel::C1),
            6 => Some(CefrLevel::C2),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CefrLevel::A1 => "A1",
            CefrLevel::A2 => "A2",
            CefrLevel::B1 => "B1",
            CefrLevel::B2 => "B2",
            CefrLevel::C1 => "C1",
            CefrLevel::C2 => "C2",
        }
    }

    /// One-sentence summary shown with an overall test result.
    pub fn summary(self) -> &'static str {
        match self {
            CefrLevel::A1 => {
                "Based on your responses, you demonstrate basic English skills across multiple areas."
            }
            CefrLevel::A2 => {
                "Your answers show elementary English proficiency with consistent performance."
            }
            CefrLevel::B1 => {
                "You have intermediate English skills with good understanding of various topics."
            }
            CefrLevel::B2 => {
                "You demonstrate upper-intermediate proficiency with strong language abilities."
            }
            CefrLevel::C1 => "You show advanced English skills with excellent command of the language.",
            CefrLevel::C2 => {
                "You have mastery-level English proficiency with near-native capabilities."
            }
        }
    }
}

impl fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CefrLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        CefrLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseLevelError {
                label: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_round_trip() {
        for level in CefrLevel::ALL {
            assert_eq!(CefrLevel::from_rank(level.rank()), Some(level));
        }
        assert_eq!(CefrLevel::from_rank(0), None);
        assert_eq!(CefrLevel::from_rank(7), None);
    }

    #[test]
    fn test_canonical_order_matches_rank() {
        let ranks: Vec<u8> = CefrLevel::ALL.iter().map(|l| l.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5, 6]);
        assert!(CefrLevel::A1 < CefrLevel::C2);
    }

    #[test]
    fn test_parse_accepts_scale_symbols() {
        assert_eq!("B2".parse::<CefrLevel>().unwrap(), CefrLevel::B2);
        assert_eq!(" c1 ".parse::<CefrLevel>().unwrap(), CefrLevel::C1);
        for level in CefrLevel::ALL {
            assert_eq!(level.to_string().parse::<CefrLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_parse_rejects_other_labels() {
        for label in ["INVALID", "", "B3", "A", "C2+"] {
            let err = label.parse::<CefrLevel>().unwrap_err();
            assert_eq!(err.label, label);
        }
    }

    #[test]
    fn test_serde_uses_symbol() {
        let json = serde_json::to_string(&CefrLevel::A2).unwrap();
        assert_eq!(json, "\"A2\"");
        let level: CefrLevel = serde_json::from_str("\"C1\"").unwrap();
        assert_eq!(level, CefrLevel::C1);
        assert!(serde_json::from_str::<CefrLevel>("\"Z9\"").is_err());
    }

    #[test]
    fn test_default_is_b1() {
        assert_eq!(CefrLevel::default(), CefrLevel::B1);
    }
}
