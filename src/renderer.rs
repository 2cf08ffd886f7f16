//! # Tide Curve ASCII Rendering
//!
//! Draws a predicted [`TideCurve`] as a terminal chart: heights on the Y axis
//! in meters, one column per sample, with the curve center marked `X`.

use crate::TideCurve;
use std::fmt::Write as _;

const ROWS: usize = 24;
const Y_AXIS_WIDTH: usize = 6; // Space for Y-axis labels

/// Height range of the curve as `(min, max)`.
fn curve_bounds(curve: &TideCurve) -> (f64, f64) {
    curve
        .samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), s| {
            (min.min(s.height_m), max.max(s.height_m))
        })
}

/// Format a height label with a sign so levels below datum stand out.
fn format_height(height_m: f64) -> String {
    if height_m.abs() < 0.005 {
        " 0.0".to_string()
    } else {
        format!("{height_m:+.1}")
    }
}

/// Render the curve to a multi-line string.
pub fn render_ascii(curve: &TideCurve) -> String {
    let mut out = String::new();
    let sample_count = curve.samples.len();
    if sample_count == 0 {
        return out;
    }

    let (min_h, max_h) = curve_bounds(curve);
    // A flat curve still needs a non-zero range to place rows
    let range = (max_h - min_h).max(1e-6);

    let height_to_row = |h: f64| {
        let normalized = (h - min_h) / range;
        (((1.0 - normalized) * (ROWS as f64 - 1.0)).round() as usize).min(ROWS - 1)
    };

    let mut grid = vec![vec![' '; sample_count + Y_AXIS_WIDTH]; ROWS];

    // Y-axis labels every 0.5 m (1 m for large ranges)
    let step = if range > 4.0 { 1.0 } else { 0.5 };
    let mut level = (min_h / step).ceil() * step;
    while level <= max_h {
        let row = height_to_row(level);
        let label = format!("{:<width$}", format_height(level), width = Y_AXIS_WIDTH - 1);
        for (i, ch) in label.chars().take(Y_AXIS_WIDTH - 1).enumerate() {
            grid[row][i] = ch;
        }
        grid[row][Y_AXIS_WIDTH - 1] = '│';
        level += step;
    }

    for (column, sample) in curve.samples.iter().enumerate() {
        let row = height_to_row(sample.height_m);
        grid[row][column + Y_AXIS_WIDTH] = if sample.mins_rel == 0 { 'X' } else { '•' };
    }

    if curve.extrapolated {
        let _ = writeln!(out, "⚠ EXTRAPOLATED beyond fitted data\n");
    }

    for row in grid {
        let _ = writeln!(out, "{}", row.into_iter().collect::<String>().trim_end());
    }

    // Hour ticks below the chart
    let padding = " ".repeat(Y_AXIS_WIDTH);
    let ticks: String = curve
        .samples
        .iter()
        .map(|s| if s.mins_rel % 60 == 0 { '|' } else { ' ' })
        .collect();
    let _ = writeln!(out, "{padding}{}", ticks.trim_end());

    let first = curve.samples[0].mins_rel;
    let last = curve.samples[sample_count - 1].mins_rel;
    let left = format!("{:+}h", first / 60);
    let right = format!("{:+}h", last / 60);
    let center = curve.center.format("%Y-%m-%d %H:%M UTC").to_string();
    let inner = sample_count.saturating_sub(left.len() + right.len());
    let _ = writeln!(out, "{padding}{left}{center:^inner$}{right}");

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sample;
    use chrono::{TimeZone, Utc};

    fn test_curve() -> TideCurve {
        TideCurve {
            center: Utc.with_ymd_and_hms(2025, 5, 11, 18, 0, 0).unwrap(),
            samples: (-12..=12)
                .map(|i| Sample {
                    mins_rel: i * 60,
                    height_m: 2.0 + 1.5 * (i as f64 * 0.5).sin(),
                })
                .collect(),
            extrapolated: false,
        }
    }

    #[test]
    fn test_format_height() {
        assert_eq!(format_height(0.0), " 0.0");
        assert_eq!(format_height(1.26), "+1.3");
        assert_eq!(format_height(-0.5), "-0.5");
    }

    #[test]
    fn test_curve_bounds() {
        let (min, max) = curve_bounds(&test_curve());
        assert!(min >= 0.5 && max <= 3.5);
        assert!(max > min);
    }

    #[test]
    fn test_ascii_rendering() {
        let text = render_ascii(&test_curve());
        assert_eq!(text.matches('X').count(), 1);
        assert_eq!(text.matches('•').count(), 24);
        assert!(text.contains("-12h"));
        assert!(text.contains("+12h"));
        assert!(text.contains("2025-05-11 18:00 UTC"));
        assert!(!text.contains("EXTRAPOLATED"));
    }

    #[test]
    fn test_extrapolated_indicator() {
        let mut curve = test_curve();
        curve.extrapolated = true;
        assert!(render_ascii(&curve).starts_with("⚠ EXTRAPOLATED"));
    }

    #[test]
    fn test_flat_and_empty_curves() {
        let mut curve = test_curve();
        for s in &mut curve.samples {
            s.height_m = 1.0;
        }
        assert_eq!(render_ascii(&curve).matches('X').count(), 1);

        curve.samples.clear();
        assert!(render_ascii(&curve).is_empty());
    }
}
