//! # Harmonic Fitter
//!
//! Ordinary least-squares harmonic regression of a water-level record onto the
//! constituents its length can resolve.
//!
//! ## Model
//!
//! ```text
//! h(t) = z₀ + b·(t − t₀) + Σⱼ fⱼ(t) · (aⱼ cos θⱼ(t) + bⱼ sin θⱼ(t))
//! θⱼ(t) = Vⱼ(t) + uⱼ(t)
//! ```
//!
//! `z₀` is the level at the epoch `t₀` (first observation), `b` the linear
//! trend in meters per day. Each constituent pair `(aⱼ, bⱼ)` becomes an
//! amplitude `Aⱼ = √(aⱼ² + bⱼ²)` and a Greenwich phase `gⱼ = atan2(bⱼ, aⱼ)`.
//!
//! ## Solver
//!
//! The design matrix is decomposed with an SVD. Explicit sinusoid bases handle
//! irregular sampling and gaps (from dropped rows and outliers) that would
//! break an FFT, and the named constituents give coefficients that can be
//! cached and inspected.

use crate::astro;
use crate::constituents::{self, NodalTerm, MIN_ABS_LATITUDE};
use crate::{ObservationSeries, TideError};
use chrono::{DateTime, Utc};
use nalgebra::{DMatrix, DVector, SVD};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Iteration cap handed to the SVD; hitting it is reported as non-convergence.
const SVD_MAX_ITERATIONS: usize = 1_000;

/// Singular values below this fraction of the largest make the system rank deficient.
const RANK_TOLERANCE: f64 = 1e-10;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Solver switches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitSettings {
    /// Minimum Rayleigh ratio for a constituent to be included
    pub rayleigh_min: f64,
    /// Apply nodal amplitude/phase corrections
    pub nodal: bool,
    /// Fit a linear trend
    pub trend: bool,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            rayleigh_min: 0.95,
            nodal: true,
            trend: true,
        }
    }
}

/// Fitted amplitude and phase of one constituent, with everything needed to
/// rebuild its argument at any instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstituentFit {
    pub name: String,
    pub doodson: [i8; 6],
    /// Equilibrium phase offset in cycles
    pub offset: f64,
    pub nodal_terms: Vec<NodalTerm>,
    pub frequency_cph: f64,
    /// Amplitude in meters, before nodal modulation
    pub amplitude: f64,
    /// Greenwich phase lag in degrees, `[0, 360)`
    pub phase_deg: f64,
}

impl ConstituentFit {
    /// Angular frequency in radians per hour.
    pub fn angular_frequency(&self) -> f64 {
        std::f64::consts::TAU * self.frequency_cph
    }

    /// Nodal factor and argument (radians) at an instant, for a station at `latitude`.
    pub fn argument(
        &self,
        astro: &astro::AstronomicalArguments,
        latitude: f64,
        apply_nodal: bool,
    ) -> (f64, f64) {
        constituents::harmonic_argument(
            &self.doodson,
            self.offset,
            &self.nodal_terms,
            astro,
            latitude,
            apply_nodal,
        )
    }
}

/// The fitted harmonic model for one station.
///
/// Immutable once produced; a change of constituents, epoch or latitude
/// requires a new fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TidalModel {
    /// First observation used in the fit; the trend is measured from here
    pub epoch: DateTime<Utc>,
    /// Last observation used in the fit
    pub fit_end: DateTime<Utc>,
    /// Latitude (degrees) the nodal corrections were computed for
    pub reference_latitude: f64,
    /// Whether nodal corrections are part of the model
    pub nodal: bool,
    /// Level at the epoch, meters
    pub mean: f64,
    /// Linear trend, meters per day
    pub trend_per_day: f64,
    pub constituents: Vec<ConstituentFit>,
    pub samples_used: usize,
    /// Root-mean-square residual of the fit, meters
    pub residual_rms: f64,
}

impl TidalModel {
    /// Hours from the epoch to `t`.
    pub fn hours_since_epoch(&self, t: DateTime<Utc>) -> f64 {
        (t - self.epoch).num_milliseconds() as f64 / MS_PER_HOUR
    }

    pub fn constituent(&self, name: &str) -> Option<&ConstituentFit> {
        self.constituents.iter().find(|c| c.name == name)
    }
}

/// Fit a harmonic model to a cleaned record.
///
/// Fails with [`TideError::FitFailure`] when the latitude is invalid, the
/// record is too short to resolve any constituent, there are fewer samples
/// than unknowns, the design matrix is rank deficient, or the SVD does not
/// converge.
pub fn fit(
    series: &ObservationSeries,
    reference_latitude: f64,
    settings: &FitSettings,
) -> Result<TidalModel, TideError> {
    let latitude = validate_latitude(reference_latitude)?;

    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return Err(TideError::FitFailure("empty observation series".into()));
    };
    let epoch = first.time;
    let span_hours = series.span_hours();

    let selected = constituents::select(span_hours, settings.rayleigh_min);
    if selected.is_empty() {
        return Err(TideError::FitFailure(format!(
            "{span_hours:.1} h record resolves no constituents at Rayleigh ratio {}",
            settings.rayleigh_min
        )));
    }

    let leading = if settings.trend { 2 } else { 1 };
    let unknowns = leading + 2 * selected.len();
    let n = series.len();
    if n < unknowns {
        return Err(TideError::FitFailure(format!(
            "{n} samples cannot determine {unknowns} unknowns ({} constituents)",
            selected.len()
        )));
    }

    debug!(
        constituents = ?selected.iter().map(|c| c.name).collect::<Vec<_>>(),
        span_hours,
        "selected constituents"
    );

    let mut design = DMatrix::<f64>::zeros(n, unknowns);
    let mut heights = DVector::<f64>::zeros(n);
    for (row, obs) in series.iter().enumerate() {
        heights[row] = obs.height_m;
        design[(row, 0)] = 1.0;
        if settings.trend {
            design[(row, 1)] = (obs.time - epoch).num_milliseconds() as f64 / MS_PER_HOUR / 24.0;
        }
        let args = astro::arguments(obs.time);
        for (j, constituent) in selected.iter().enumerate() {
            let (f, theta) = constituent.argument(&args, latitude, settings.nodal);
            design[(row, leading + 2 * j)] = f * theta.cos();
            design[(row, leading + 2 * j + 1)] = f * theta.sin();
        }
    }

    let coefficients = solve(&design, &heights)?;
    let residual = &design * &coefficients - &heights;
    let residual_rms = (residual.norm_squared() / n as f64).sqrt();

    let constituents = selected
        .iter()
        .enumerate()
        .map(|(j, c)| {
            let a = coefficients[leading + 2 * j];
            let b = coefficients[leading + 2 * j + 1];
            ConstituentFit {
                name: c.name.to_string(),
                doodson: c.doodson,
                offset: c.offset,
                nodal_terms: c.nodal.to_vec(),
                frequency_cph: c.frequency_cph(),
                amplitude: a.hypot(b),
                phase_deg: b.atan2(a).to_degrees().rem_euclid(360.0),
            }
        })
        .collect::<Vec<_>>();

    let model = TidalModel {
        epoch,
        fit_end: last.time,
        reference_latitude: latitude,
        nodal: settings.nodal,
        mean: coefficients[0],
        trend_per_day: if settings.trend { coefficients[1] } else { 0.0 },
        constituents,
        samples_used: n,
        residual_rms,
    };

    info!(
        samples = n,
        constituents = model.constituents.len(),
        residual_rms,
        "harmonic model fitted"
    );
    Ok(model)
}

fn validate_latitude(latitude: f64) -> Result<f64, TideError> {
    if !latitude.is_finite() || latitude.abs() > 90.0 {
        return Err(TideError::FitFailure(format!(
            "reference latitude {latitude} is not a valid latitude"
        )));
    }
    if latitude.abs() < MIN_ABS_LATITUDE {
        let clamped = if latitude < 0.0 {
            -MIN_ABS_LATITUDE
        } else {
            MIN_ABS_LATITUDE
        };
        debug!(latitude, clamped, "clamping near-equatorial reference latitude");
        return Ok(clamped);
    }
    Ok(latitude)
}

fn solve(design: &DMatrix<f64>, heights: &DVector<f64>) -> Result<DVector<f64>, TideError> {
    let svd = SVD::try_new(design.clone(), true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or_else(|| TideError::FitFailure("SVD did not converge".into()))?;

    let max_sv = svd.singular_values.max();
    let min_sv = svd.singular_values.min();
    if max_sv.is_nan() || max_sv <= 0.0 || min_sv / max_sv < RANK_TOLERANCE {
        return Err(TideError::FitFailure(format!(
            "design matrix is rank deficient (condition {:.3e})",
            max_sv / min_sv
        )));
    }

    svd.solve(heights, f64::EPSILON * max_sv)
        .map_err(|e| TideError::FitFailure(e.to_string()))
}
