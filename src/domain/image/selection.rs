use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// How a candidate is picked among image search results
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageSelectionPolicy {
    /// Uniformly random candidate
    #[default]
    Random,
    /// Always the top result
    First,
}

impl ImageSelectionPolicy {
    /// Index of the chosen candidate, `None` when there are none
    pub fn select(&self, candidates: usize) -> Option<usize> {
        if candidates == 0 {
            return None;
        }

        match self {
            Self::Random => Some(rand::thread_rng().gen_range(0..candidates)),
            Self::First => Some(0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::First => "first",
        }
    }
}

impl fmt::Display for ImageSelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSelectionPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "first" => Ok(Self::First),
            other => Err(DomainError::configuration(format!(
                "Unknown image selection policy '{}'",
                other
            ))),
        }
    }
}
