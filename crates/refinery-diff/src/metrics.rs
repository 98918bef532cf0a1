use refinery_analysis::Analysis;
use serde::{Deserialize, Serialize};

/// Minimum history length before a trend is computed
const MIN_TREND_ITERATIONS: usize = 4;

/// Read access to one entry of an iteration history
pub trait Snapshot {
    fn analysis(&self) -> &Analysis;
    fn is_satisfied(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Increasing => write!(f, "increasing"),
            Trend::Decreasing => write!(f, "decreasing"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationMetrics {
    pub total_iterations: usize,
    pub satisfied_iterations: usize,
    /// Mean list-item count, rounded to one decimal
    pub average_items_per_iteration: f64,
    pub trend: Trend,
}

/// Aggregate metrics over an iteration history
pub fn calculate_iteration_metrics<S: Snapshot>(iterations: &[S]) -> IterationMetrics {
    if iterations.is_empty() {
        return IterationMetrics::default();
    }

    let counts: Vec<usize> = iterations.iter().map(|i| i.analysis().item_count()).collect();

    IterationMetrics {
        total_iterations: iterations.len(),
        satisfied_iterations: iterations.iter().filter(|i| i.is_satisfied()).count(),
        average_items_per_iteration: round_one_decimal(mean(&counts)),
        trend: trend(&counts),
    }
}

/// Compare the mean of the second half of the history against the first
fn trend(counts: &[usize]) -> Trend {
    if counts.len() < MIN_TREND_ITERATIONS {
        return Trend::Stable;
    }

    let (first, second) = counts.split_at(counts.len() / 2);
    let first = mean(first);
    let second = mean(second);

    if second > first * 1.1 {
        Trend::Increasing
    } else if second < first * 0.9 {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

fn mean(values: &[usize]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<usize>() as f64 / values.len() as f64
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
