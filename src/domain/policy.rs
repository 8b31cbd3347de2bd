//! Recommended maximum epsilon by societal value and reidentification risk.

use serde::{Deserialize, Serialize};

/// Three-level rating used by both policy axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    /// All levels, lowest first.
    pub const ALL: [Level; 3] = [Level::Low, Level::Medium, Level::High];

    fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "0" => Ok(Self::Low),
            "medium" | "1" => Ok(Self::Medium),
            "high" | "2" => Ok(Self::High),
            other => Err(format!("Unknown level '{other}'")),
        }
    }
}

/// Rows: societal value of the data. Columns: reidentification risk.
const RECOMMENDED_EPSILON: [[u8; 3]; 3] = [
    [3, 2, 1], // low value
    [5, 4, 3], // medium value
    [7, 6, 5], // high value
];

/// Recommended maximum epsilon for a release.
#[must_use]
pub fn recommended_epsilon(societal_value: Level, reidentification_risk: Level) -> u8 {
    RECOMMENDED_EPSILON[societal_value.index()][reidentification_risk.index()]
}
