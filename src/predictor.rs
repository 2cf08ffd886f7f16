//! # Tide Height Reconstruction
//!
//! Evaluates a fitted [`TidalModel`] at arbitrary instants.
//!
//! Every query instant is normalized to UTC and shifted forward by the gauge
//! lag before evaluation. Predictions far outside the fitted window are
//! allowed; accuracy degrades with distance from it (mostly through the trend
//! term and unresolved constituents), and no bound is enforced.

use crate::harmonic::TidalModel;
use crate::{astro, Sample, TideCurve};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

/// Tide-gauge clock lag applied to every query (minutes).
///
/// Observed against the Dublin Port record; may be station specific.
pub const DEFAULT_GAUGE_LAG_MINUTES: i64 = 6;

/// Interpret a timestamp without offset as UTC.
pub fn assume_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&naive)
}

/// Stateless height evaluator.
#[derive(Debug, Clone, Copy)]
pub struct Predictor {
    lag: Duration,
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new(DEFAULT_GAUGE_LAG_MINUTES)
    }
}

impl Predictor {
    /// A lag outside chrono's range falls back to [`DEFAULT_GAUGE_LAG_MINUTES`].
    pub fn new(gauge_lag_minutes: i64) -> Self {
        let lag = Duration::try_minutes(gauge_lag_minutes).unwrap_or_else(|| {
            warn!(
                gauge_lag_minutes,
                default = DEFAULT_GAUGE_LAG_MINUTES,
                "gauge lag out of range, using default"
            );
            Duration::minutes(DEFAULT_GAUGE_LAG_MINUTES)
        });
        Self { lag }
    }

    pub fn gauge_lag(&self) -> Duration {
        self.lag
    }

    /// Predicted height in meters at one instant.
    pub fn height_at<Tz: TimeZone>(&self, model: &TidalModel, at: &DateTime<Tz>) -> f64 {
        evaluate(model, at.with_timezone(&Utc) + self.lag)
    }

    /// Predicted heights for a sequence of instants, in input order.
    pub fn predict<Tz: TimeZone>(&self, model: &TidalModel, times: &[DateTime<Tz>]) -> Vec<f64> {
        times.iter().map(|t| self.height_at(model, t)).collect()
    }

    /// Regular grid of predictions from `center - half_window` to `center + half_window`.
    pub fn curve<Tz: TimeZone>(
        &self,
        model: &TidalModel,
        center: &DateTime<Tz>,
        half_window: Duration,
        step: Duration,
    ) -> TideCurve {
        let center = center.with_timezone(&Utc);
        let half_mins = half_window.num_minutes();
        let step_mins = step.num_minutes().max(1);

        let samples: Vec<Sample> = (-half_mins..=half_mins)
            .step_by(step_mins as usize)
            .map(|m| Sample {
                mins_rel: m as i32,
                height_m: self.height_at(model, &(center + Duration::minutes(m))),
            })
            .collect();

        TideCurve {
            center,
            extrapolated: center + half_window > model.fit_end,
            samples,
        }
    }
}

/// Sum of mean, trend and every constituent at a UTC instant (no lag applied).
fn evaluate(model: &TidalModel, at: DateTime<Utc>) -> f64 {
    let args = astro::arguments(at);
    let trend = model.trend_per_day * model.hours_since_epoch(at) / 24.0;

    let tide: f64 = model
        .constituents
        .iter()
        .map(|c| {
            let (f, theta) = c.argument(&args, model.reference_latitude, model.nodal);
            f * c.amplitude * (theta - c.phase_deg.to_radians()).cos()
        })
        .sum();

    model.mean + trend + tide
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constituents::by_name;
    use crate::harmonic::ConstituentFit;
    use chrono::FixedOffset;

    fn m2_only_model() -> TidalModel {
        let m2 = by_name("M2").unwrap();
        let epoch = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        TidalModel {
            epoch,
            fit_end: epoch + Duration::days(90),
            reference_latitude: 53.35,
            nodal: true,
            mean: 2.0,
            trend_per_day: 0.001,
            constituents: vec![ConstituentFit {
                name: "M2".into(),
                doodson: m2.doodson,
                offset: m2.offset,
                nodal_terms: m2.nodal.to_vec(),
                frequency_cph: m2.frequency_cph(),
                amplitude: 1.5,
                phase_deg: 120.0,
            }],
            samples_used: 2160,
            residual_rms: 0.05,
        }
    }

    #[test]
    fn test_deterministic() {
        let model = m2_only_model();
        let p = Predictor::default();
        let t = Utc.with_ymd_and_hms(2025, 5, 11, 18, 10, 0).unwrap();
        assert_eq!(p.height_at(&model, &t).to_bits(), p.height_at(&model, &t).to_bits());
    }

    #[test]
    fn test_lag_shifts_query() {
        let model = m2_only_model();
        let t = Utc.with_ymd_and_hms(2025, 5, 11, 18, 10, 0).unwrap();
        let lagged = Predictor::new(6).height_at(&model, &t);
        let unlagged = Predictor::new(0).height_at(&model, &(t + Duration::minutes(6)));
        assert_eq!(lagged, unlagged);
    }

    #[test]
    fn test_out_of_range_lag_uses_default() {
        assert_eq!(Predictor::new(i64::MAX).gauge_lag(), Duration::minutes(DEFAULT_GAUGE_LAG_MINUTES));
        assert_eq!(Predictor::new(i64::MIN).gauge_lag(), Duration::minutes(DEFAULT_GAUGE_LAG_MINUTES));
        assert_eq!(Predictor::new(-3).gauge_lag(), Duration::minutes(-3));
    }

    #[test]
    fn test_bounded_by_amplitude() {
        let model = m2_only_model();
        let p = Predictor::new(0);
        let start = model.epoch;
        for h in 0..48 {
            let t = start + Duration::hours(h);
            let height = p.height_at(&model, &t);
            let trend = 0.001 * h as f64 / 24.0;
            // f_M2 never exceeds 1.04
            assert!((height - 2.0 - trend).abs() <= 1.5 * 1.04 + 1e-9);
        }
    }

    #[test]
    fn test_offset_timezone_matches_utc() {
        let model = m2_only_model();
        let p = Predictor::default();
        let utc = Utc.with_ymd_and_hms(2025, 5, 11, 18, 10, 0).unwrap();
        let dublin_summer = utc.with_timezone(&FixedOffset::east_opt(3600).unwrap());
        assert_eq!(p.height_at(&model, &utc), p.height_at(&model, &dublin_summer));
    }

    #[test]
    fn test_naive_assumed_utc() {
        let naive = NaiveDateTime::parse_from_str("2025-05-11 18:10:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(assume_utc(naive), Utc.with_ymd_and_hms(2025, 5, 11, 18, 10, 0).unwrap());
    }

    #[test]
    fn test_curve_shape() {
        let model = m2_only_model();
        let p = Predictor::default();
        let center = model.epoch + Duration::days(10);
        let curve = p.curve(&model, &center, Duration::hours(12), Duration::minutes(10));

        assert_eq!(curve.samples.len(), 145);
        assert_eq!(curve.samples.first().unwrap().mins_rel, -720);
        assert_eq!(curve.samples.last().unwrap().mins_rel, 720);
        assert!(!curve.extrapolated);

        let mid = curve.samples.iter().find(|s| s.mins_rel == 0).unwrap();
        assert_eq!(mid.height_m, p.height_at(&model, &center));

        let late = p.curve(&model, &model.fit_end, Duration::hours(12), Duration::minutes(10));
        assert!(late.extrapolated);
    }
}
