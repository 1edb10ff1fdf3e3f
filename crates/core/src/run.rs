use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dimension::Dimension;
use crate::error::ModelError;
use crate::task::TaskSource;

/// Unique run identifier.
pub type RunId = Uuid;

/// The whole benchmark run failed before producing measurements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub message: String,
}

impl RunError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One dimension failed inside an otherwise successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementError {
    pub message: String,
}

/// Ordered, non-empty list of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct MeasurementValues(Vec<f64>);

impl MeasurementValues {
    pub fn new(values: Vec<f64>) -> Result<Self, ModelError> {
        if values.is_empty() {
            return Err(ModelError::EmptyValues);
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn mean(&self) -> f64 {
        self.0.iter().sum::<f64>() / self.0.len() as f64
    }

    /// Sample variance (n - 1 denominator). Zero for a single sample.
    pub fn variance(&self) -> f64 {
        if self.0.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        self.0.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (self.0.len() - 1) as f64
    }
}

impl TryFrom<Vec<f64>> for MeasurementValues {
    type Error = ModelError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<MeasurementValues> for Vec<f64> {
    fn from(values: MeasurementValues) -> Self {
        values.0
    }
}

/// Result for one dimension within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    Error(MeasurementError),
    Values(MeasurementValues),
}

impl Measurement {
    pub fn error(message: impl Into<String>) -> Self {
        Measurement::Error(MeasurementError {
            message: message.into(),
        })
    }

    pub fn values(&self) -> Option<&MeasurementValues> {
        match self {
            Measurement::Values(v) => Some(v),
            Measurement::Error(_) => None,
        }
    }
}

/// At most one measurement per dimension, iterated in dimension order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Measurements(BTreeMap<Dimension, Measurement>);

impl Measurements {
    /// Build from entries, rejecting duplicate dimensions.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (Dimension, Measurement)>,
    ) -> Result<Self, ModelError> {
        let mut map = BTreeMap::new();
        for (dimension, measurement) in entries {
            if map.contains_key(&dimension) {
                return Err(ModelError::DuplicateDimension(dimension.to_string()));
            }
            map.insert(dimension, measurement);
        }
        Ok(Self(map))
    }

    pub fn get(&self, dimension: &Dimension) -> Option<&Measurement> {
        self.0.get(dimension)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Dimension, &Measurement)> {
        self.0.iter()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Serialized as a list since JSON object keys must be strings.
#[derive(Serialize, Deserialize)]
struct MeasurementEntry {
    dimension: Dimension,
    measurement: Measurement,
}

impl Serialize for Measurements {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        let mut seq = s.serialize_seq(Some(self.0.len()))?;
        for (dimension, measurement) in &self.0 {
            seq.serialize_element(&MeasurementEntry {
                dimension: dimension.clone(),
                measurement: measurement.clone(),
            })?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Measurements {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let entries: Vec<MeasurementEntry> = Deserialize::deserialize(d)?;
        Measurements::from_entries(entries.into_iter().map(|e| (e.dimension, e.measurement)))
            .map_err(serde::de::Error::custom)
    }
}

/// Exactly one of: the whole run failed, or per-dimension measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    Failed(RunError),
    Measured(Measurements),
}

/// The outcome of executing one task on a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub author: String,
    pub runner_name: String,
    pub runner_info: String,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub source: TaskSource,
    pub result: RunResult,
}

impl Run {
    pub fn is_failed(&self) -> bool {
        matches!(self.result, RunResult::Failed(_))
    }

    pub fn measurements(&self) -> Option<&Measurements> {
        match &self.result {
            RunResult::Measured(m) => Some(m),
            RunResult::Failed(_) => None,
        }
    }
}
