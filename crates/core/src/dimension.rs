use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A `(benchmark, metric)` pair identifying one measured quantity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dimension {
    pub benchmark: String,
    pub metric: String,
}

impl Dimension {
    pub fn new(benchmark: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            benchmark: benchmark.into(),
            metric: metric.into(),
        }
    }

    /// Parse the `benchmark:metric` form. The benchmark name may not contain `:`.
    pub fn parse(s: &str) -> Result<Self, ModelError> {
        match s.split_once(':') {
            Some((benchmark, metric)) if !benchmark.is_empty() && !metric.is_empty() => {
                Ok(Self::new(benchmark.trim(), metric.trim()))
            }
            _ => Err(ModelError::InvalidDimension(s.to_string())),
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.benchmark, self.metric)
    }
}

/// How a change in a dimension should be judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Interpretation {
    LessIsBetter,
    MoreIsBetter,
    #[default]
    Neutral,
}

impl Interpretation {
    /// Sign that turns a raw change into "positive means better".
    /// Neutral dimensions have no direction.
    pub fn direction(self) -> f64 {
        match self {
            Interpretation::LessIsBetter => -1.0,
            Interpretation::MoreIsBetter => 1.0,
            Interpretation::Neutral => 0.0,
        }
    }
}

/// Process-wide metadata for a [`Dimension`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionInfo {
    pub unit: String,
    pub interpretation: Interpretation,
    /// Whether changes in this dimension are reported at all.
    pub significant: bool,
}

impl Default for DimensionInfo {
    fn default() -> Self {
        Self {
            unit: String::new(),
            interpretation: Interpretation::Neutral,
            significant: true,
        }
    }
}
