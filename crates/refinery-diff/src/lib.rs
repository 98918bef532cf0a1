//! # refinery-diff
//!
//! Structural comparison between analysis snapshots and trend metrics over
//! an iteration history. Everything here is pure.
//!
//! List entries are matched by exact string equality. A reworded entry shows
//! up as one removal plus one addition; there is no "modified" entry.

mod compare;
mod metrics;

pub use compare::{
    compare_analyses, diff_lists, AnalysisComparison, ChangeType, DiffItem, DiffKind, FieldDiff,
    ItemChanges,
};
pub use metrics::{calculate_iteration_metrics, IterationMetrics, Snapshot, Trend};
