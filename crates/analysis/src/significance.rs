use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use velo_core::config::AnalysisConfig;
use velo_core::{Dimension, Measurement, Run, RunId, RunResult};

use crate::registry::DimensionRegistry;
use crate::stats;

/// Thresholds a change must cross to be flagged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignificanceFactors {
    /// Minimum absolute percent change.
    pub threshold_percent: f64,
    /// Minimum sigma, applied only when sigma is available.
    pub min_sigma: f64,
}

impl Default for SignificanceFactors {
    fn default() -> Self {
        Self {
            threshold_percent: 5.0,
            min_sigma: 2.0,
        }
    }
}

impl From<&AnalysisConfig> for SignificanceFactors {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            threshold_percent: config.significance_threshold_percent,
            min_sigma: config.min_sigma,
        }
    }
}

/// Change of one dimension between the previous run and this one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionDifference {
    pub dimension: Dimension,
    pub old_avg: f64,
    pub new_avg: f64,
    pub run_id: RunId,
    /// Distance in pooled standard errors, if both runs had several samples.
    pub sigma: Option<f64>,
}

impl DimensionDifference {
    /// Raw percent change. `None` for a zero baseline.
    pub fn percent_change(&self) -> Option<f64> {
        if self.old_avg == 0.0 {
            return None;
        }
        Some((self.new_avg - self.old_avg) / self.old_avg * 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Marker {
    Improvement,
    Regression,
    Unflagged,
}

impl Marker {
    pub fn symbol(self) -> char {
        match self {
            Marker::Improvement => '+',
            Marker::Regression => '-',
            Marker::Unflagged => ' ',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RowKind {
    Changed {
        difference: DimensionDifference,
        marker: Marker,
    },
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub dimension: Dimension,
    pub kind: RowKind,
}

/// Analysis of one run. Rows are sorted by dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub run_id: RunId,
    pub rows: Vec<ReportRow>,
    /// Set when the whole run failed.
    pub run_error: Option<String>,
}

impl Report {
    pub fn changed(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows
            .iter()
            .filter(|r| matches!(r.kind, RowKind::Changed { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows
            .iter()
            .filter(|r| matches!(r.kind, RowKind::Failed))
    }

    pub fn has_flagged(&self) -> bool {
        self.rows.iter().any(|r| {
            matches!(
                r.kind,
                RowKind::Changed {
                    marker: Marker::Improvement | Marker::Regression,
                    ..
                }
            )
        })
    }

    pub fn has_failures(&self) -> bool {
        self.run_error.is_some() || self.failed().next().is_some()
    }

    /// Whether a human should hear about this run.
    pub fn is_noteworthy(&self) -> bool {
        self.has_flagged() || self.has_failures()
    }
}

/// Compare `run` with `previous` and classify every dimension of either.
///
/// - a failed run, or an errored or missing measurement in `run`, is failed
/// - dimensions without a usable baseline are omitted
/// - dimensions the registry marks insignificant are omitted
/// - the rest get a percent change, a sigma when available, and a marker
pub fn analyze(
    run: &Run,
    previous: Option<&Run>,
    registry: &DimensionRegistry,
    factors: &SignificanceFactors,
) -> Report {
    let old = previous.and_then(Run::measurements);

    let new = match &run.result {
        RunResult::Failed(error) => {
            let rows = old
                .map(|old| {
                    old.dimensions()
                        .map(|dimension| ReportRow {
                            dimension: dimension.clone(),
                            kind: RowKind::Failed,
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Report {
                run_id: run.id,
                rows,
                run_error: Some(error.message.clone()),
            };
        }
        RunResult::Measured(measurements) => measurements,
    };

    let Some(old) = old else {
        debug!(run_id = %run.id, "no baseline run, nothing to compare");
        return Report {
            run_id: run.id,
            rows: Vec::new(),
            run_error: None,
        };
    };

    let dimensions: BTreeSet<&Dimension> = old.dimensions().chain(new.dimensions()).collect();
    let mut rows = Vec::new();

    for dimension in dimensions {
        let new_values = match new.get(dimension) {
            Some(Measurement::Values(values)) => values,
            Some(Measurement::Error(_)) | None => {
                rows.push(ReportRow {
                    dimension: dimension.clone(),
                    kind: RowKind::Failed,
                });
                continue;
            }
        };
        let Some(old_values) = old.get(dimension).and_then(Measurement::values) else {
            continue;
        };

        let info = registry.info(dimension);
        if !info.significant {
            continue;
        }

        let difference = DimensionDifference {
            dimension: dimension.clone(),
            old_avg: old_values.mean(),
            new_avg: new_values.mean(),
            run_id: run.id,
            sigma: stats::sigma(old_values, new_values),
        };
        let marker = classify(&difference, info.interpretation.direction(), factors);
        rows.push(ReportRow {
            dimension: dimension.clone(),
            kind: RowKind::Changed { difference, marker },
        });
    }

    Report {
        run_id: run.id,
        rows,
        run_error: None,
    }
}

fn classify(difference: &DimensionDifference, direction: f64, factors: &SignificanceFactors) -> Marker {
    let Some(percent) = difference.percent_change() else {
        return Marker::Unflagged;
    };
    if direction == 0.0 || percent.abs() < factors.threshold_percent {
        return Marker::Unflagged;
    }
    if difference.sigma.is_some_and(|s| s < factors.min_sigma) {
        return Marker::Unflagged;
    }
    let signed = direction * percent;
    if signed > 0.0 {
        Marker::Improvement
    } else if signed < 0.0 {
        Marker::Regression
    } else {
        Marker::Unflagged
    }
}
