//! Benchmark script output.
//!
//! A script prints one JSON document on stdout. Either the whole run failed:
//!
//! ```json
//! {"error": "could not build"}
//! ```
//!
//! or every benchmark maps its metrics to samples or a per-metric error:
//!
//! ```json
//! {"parse": {"time": {"unit": "s", "interpretation": "LESS_IS_BETTER", "values": [1.2, 1.3]},
//!            "rss": {"error": "not supported"}}}
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

use velo_core::{
    Dimension, Interpretation, Measurement, MeasurementValues, Measurements, RunError, RunResult,
};
use velo_wire::ReportedDimension;

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptOutput {
    Failed { error: String },
    Measured(BTreeMap<String, BTreeMap<String, MetricOutput>>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MetricOutput {
    Failed {
        error: String,
    },
    Values {
        #[serde(default)]
        unit: String,
        #[serde(default)]
        interpretation: Interpretation,
        values: Vec<f64>,
    },
}

/// What a script reported, ready for a `BenchmarkDone`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOutput {
    pub result: RunResult,
    pub dimensions: Vec<ReportedDimension>,
}

impl ParsedOutput {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            result: RunResult::Failed(RunError::new(message)),
            dimensions: Vec::new(),
        }
    }
}

pub fn parse(stdout: &str) -> ParsedOutput {
    let output: ScriptOutput = match serde_json::from_str(stdout.trim()) {
        Ok(output) => output,
        Err(e) => return ParsedOutput::failed(format!("unparsable benchmark output: {e}")),
    };

    let benchmarks = match output {
        ScriptOutput::Failed { error } => return ParsedOutput::failed(error),
        ScriptOutput::Measured(benchmarks) => benchmarks,
    };

    let mut entries = Vec::new();
    let mut dimensions = Vec::new();
    for (benchmark, metrics) in benchmarks {
        for (metric, output) in metrics {
            let dimension = Dimension::new(benchmark.as_str(), metric);
            let measurement = match output {
                MetricOutput::Failed { error } => Measurement::error(error),
                MetricOutput::Values {
                    unit,
                    interpretation,
                    values,
                } => {
                    dimensions.push(ReportedDimension {
                        dimension: dimension.clone(),
                        unit,
                        interpretation,
                    });
                    match MeasurementValues::new(values) {
                        Ok(values) => Measurement::Values(values),
                        Err(_) => Measurement::error("no values reported"),
                    }
                }
            };
            entries.push((dimension, measurement));
        }
    }

    // Keys of a JSON object are unique, so entries never collide.
    match Measurements::from_entries(entries) {
        Ok(measurements) => ParsedOutput {
            result: RunResult::Measured(measurements),
            dimensions,
        },
        Err(e) => ParsedOutput::failed(e.to_string()),
    }
}
