//! Significance analysis of benchmark runs against their predecessor.
//!
//! [`analyze`] classifies every dimension of a run as changed, failed or
//! omitted; [`render_diff`] turns the result into a fixed-width diff block
//! for humans.

pub mod registry;
pub mod render;
pub mod significance;
pub mod stats;

pub use registry::DimensionRegistry;
pub use render::render_diff;
pub use significance::{
    analyze, DimensionDifference, Marker, Report, ReportRow, RowKind, SignificanceFactors,
};
