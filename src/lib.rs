//! # Tide Predictor Core Library
//!
//! Predicts sea-surface height at arbitrary instants for a single tide-gauge
//! station from its recent water-level record, using harmonic (tidal
//! constituent) analysis.
//!
//! ## Data Flow
//!
//! 1. **Fetch**: [`tide_data`] pulls the last N days of gauge readings from the
//!    remote ERDDAP endpoint, falling back to the local CSV cache
//! 2. **Clean**: [`outliers`] drops samples beyond a z-score threshold
//! 3. **Fit**: [`harmonic`] solves for amplitude/phase per constituent, with
//!    nodal correction and a linear trend
//! 4. **Persist**: [`model_cache`] stores the fitted [`harmonic::TidalModel`]
//! 5. **Predict**: [`predictor`] reconstructs heights at query instants
//!
//! [`lifecycle`] ties the stages together and exposes the two entry points the
//! outside world uses: `predict_tide` and `rebuild_model`.
//!
//! ## Core Types
//!
//! - [`Observation`] / [`ObservationSeries`]: the cleaned gauge record
//! - [`Sample`] / [`TideCurve`]: a predicted curve around an instant, for display

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod astro;
pub mod config;
pub mod constituents;
pub mod error;
pub mod harmonic;
pub mod lifecycle;
pub mod model_cache;
pub mod outliers;
pub mod predictor;
pub mod renderer;
pub mod tide_data;

#[cfg(test)]
mod tests;

pub use error::TideError;

/// A single water-level reading from the tide gauge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Reading time, normalized to UTC
    pub time: DateTime<Utc>,
    /// Water level in meters above the station datum
    pub height_m: f64,
}

/// Time-ordered water-level record for one station.
///
/// Built only through [`ObservationSeries::from_unordered`], which enforces the
/// invariants every consumer relies on:
/// - strictly increasing timestamps (no duplicates)
/// - finite heights
///
/// A series is never mutated after construction; a refresh produces a new one.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use tide_predictor::{Observation, ObservationSeries};
///
/// let t = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
/// let series = ObservationSeries::from_unordered(vec![
///     Observation { time: t + chrono::Duration::hours(1), height_m: 2.1 },
///     Observation { time: t, height_m: 1.9 },
///     Observation { time: t, height_m: 1.9 },
/// ]);
///
/// assert_eq!(series.len(), 2);
/// assert_eq!(series.first().unwrap().time, t);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObservationSeries {
    observations: Vec<Observation>,
}

impl ObservationSeries {
    /// Sort, drop non-finite heights and collapse duplicate timestamps
    /// (the first reading for an instant wins).
    pub fn from_unordered(mut observations: Vec<Observation>) -> Self {
        observations.retain(|o| o.height_m.is_finite());
        // stable sort keeps the original order among equal timestamps
        observations.sort_by_key(|o| o.time);
        observations.dedup_by_key(|o| o.time);
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn first(&self) -> Option<&Observation> {
        self.observations.first()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }

    pub fn heights(&self) -> impl Iterator<Item = f64> + '_ {
        self.observations.iter().map(|o| o.height_m)
    }

    /// Record length in hours, zero for fewer than two samples.
    pub fn span_hours(&self) -> f64 {
        match (self.first(), self.last()) {
            (Some(a), Some(b)) => (b.time - a.time).num_milliseconds() as f64 / 3_600_000.0,
            _ => 0.0,
        }
    }

    /// Keep the observations matching `keep`, preserving order.
    ///
    /// Filtering cannot break the ordering invariants, so no re-sort happens.
    pub fn retain_where<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&Observation) -> bool,
    {
        Self {
            observations: self.observations.iter().copied().filter(|o| keep(o)).collect(),
        }
    }
}

/// One point on a predicted tide curve, positioned relative to the curve center.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Minutes relative to the curve center (negative = earlier)
    pub mins_rel: i32,
    /// Predicted height in meters
    pub height_m: f64,
}

/// Predicted heights on a regular grid around an instant.
///
/// The default window used by the CLI is ±12 hours in 10 minute steps,
/// giving 145 samples with the center at `mins_rel == 0`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TideCurve {
    /// Instant the curve is centered on
    pub center: DateTime<Utc>,
    /// Samples in chronological order
    pub samples: Vec<Sample>,
    /// True if any sample lies past the end of the fitted observation window
    pub extrapolated: bool,
}
