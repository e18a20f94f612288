//! Summary statistics over the fetch latency series.

/// Mean and requested quantiles of a non-empty series.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub mean: f64,
    /// (level, value) pairs in the order requested.
    pub quantiles: Vec<(f64, f64)>,
}

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Result<f64, StatsError> {
    if values.is_empty() {
        return Err(StatsError::EmptySeries);
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Quantile of an ascending-sorted slice, interpolating linearly between the
/// order statistics around rank `q * (n - 1)`.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Quantiles at each level in `levels`, sorting the series once.
pub fn quantiles(values: &[f64], levels: &[f64]) -> Result<Vec<f64>, StatsError> {
    if values.is_empty() {
        return Err(StatsError::EmptySeries);
    }
    if let Some(&bad) = levels.iter().find(|q| !(0.0..=1.0).contains(*q)) {
        return Err(StatsError::InvalidQuantile(bad));
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(levels.iter().map(|&q| quantile_sorted(&sorted, q)).collect())
}

/// Consume the latency series into its summary.
pub fn finalize(times: &[f64], levels: &[f64]) -> Result<Summary, StatsError> {
    let mean = mean(times)?;
    let values = quantiles(times, levels)?;
    tracing::debug!(samples = times.len(), mean, "latency summary computed");
    Ok(Summary {
        mean,
        quantiles: levels.iter().copied().zip(values).collect(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatsError {
    /// No "fetch response" records were seen.
    EmptySeries,
    InvalidQuantile(f64),
}

impl std::fmt::Display for StatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsError::EmptySeries => {
                write!(f, "no fetch response records: latency series is empty")
            }
            StatsError::InvalidQuantile(q) => {
                write!(f, "quantile level {q} is outside [0, 1]")
            }
        }
    }
}

impl std::error::Error for StatsError {}
