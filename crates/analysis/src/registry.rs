use std::collections::HashMap;

use tracing::debug;

use velo_core::{Dimension, DimensionInfo, Interpretation};

/// Process-wide dimension metadata.
///
/// Units and interpretations come from what benchmark scripts report; the
/// significance flag is owned by the operator and survives re-reports.
#[derive(Debug, Clone, Default)]
pub struct DimensionRegistry {
    infos: HashMap<Dimension, DimensionInfo>,
}

impl DimensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry where the given dimensions are never reported.
    pub fn with_insignificant<'a>(dimensions: impl IntoIterator<Item = &'a Dimension>) -> Self {
        let mut registry = Self::new();
        for dimension in dimensions {
            registry.set_significant(dimension.clone(), false);
        }
        registry
    }

    /// Metadata for `dimension`, or the defaults if it was never seen.
    pub fn info(&self, dimension: &Dimension) -> DimensionInfo {
        self.infos.get(dimension).cloned().unwrap_or_default()
    }

    pub fn insert(&mut self, dimension: Dimension, info: DimensionInfo) {
        self.infos.insert(dimension, info);
    }

    pub fn set_significant(&mut self, dimension: Dimension, significant: bool) {
        self.infos.entry(dimension).or_default().significant = significant;
    }

    /// Merge unit and interpretation reported by a run.
    pub fn merge_reported(
        &mut self,
        dimension: Dimension,
        unit: impl Into<String>,
        interpretation: Interpretation,
    ) {
        let unit = unit.into();
        let entry = self.infos.entry(dimension.clone()).or_default();
        if entry.unit != unit || entry.interpretation != interpretation {
            debug!(dimension = %dimension, unit = %unit, ?interpretation, "dimension metadata updated");
        }
        entry.unit = unit;
        entry.interpretation = interpretation;
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

impl FromIterator<(Dimension, DimensionInfo)> for DimensionRegistry {
    fn from_iter<I: IntoIterator<Item = (Dimension, DimensionInfo)>>(iter: I) -> Self {
        Self {
            infos: iter.into_iter().collect(),
        }
    }
}
