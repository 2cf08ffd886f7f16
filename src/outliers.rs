//! Z-score outlier rejection, run once on the raw record before fitting.

use crate::ObservationSeries;
use tracing::info;

/// Default rejection threshold in standard deviations.
pub const DEFAULT_Z_THRESHOLD: f64 = 3.0;

/// Drop samples whose |height − mean| exceeds `z_threshold` sample standard
/// deviations of the whole series.
///
/// Returns a new series; the input is untouched. A series with fewer than two
/// samples or zero spread is returned unchanged.
pub fn filter(series: &ObservationSeries, z_threshold: f64) -> ObservationSeries {
    let Some((mean, std_dev)) = mean_and_std(series) else {
        return series.clone();
    };
    if std_dev == 0.0 {
        return series.clone();
    }

    let filtered = series.retain_where(|o| ((o.height_m - mean) / std_dev).abs() <= z_threshold);

    info!(
        removed = series.len() - filtered.len(),
        kept = filtered.len(),
        z_threshold,
        "outlier filter applied"
    );
    filtered
}

/// Mean and sample (n − 1) standard deviation, `None` below two samples.
fn mean_and_std(series: &ObservationSeries) -> Option<(f64, f64)> {
    let n = series.len();
    if n < 2 {
        return None;
    }
    let mean = series.heights().sum::<f64>() / n as f64;
    let var = series.heights().map(|h| (h - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    Some((mean, var.sqrt()))
}
