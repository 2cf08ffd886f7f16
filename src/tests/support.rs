//! Test doubles and synthetic data.

use crate::harmonic::FitSettings;
use crate::lifecycle::{ModelLifecycle, PipelineSettings, TideService};
use crate::model_cache::ModelCache;
use crate::predictor::Predictor;
use crate::tide_data::{ObservationStore, RemoteSource};
use crate::{Observation, ObservationSeries, TideError};
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use std::f64::consts::TAU;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) const COLUMN: &str = "Water_Level_LAT";

/// Remote source answering with a canned body or HTTP status.
pub(crate) struct StubSource {
    response: Mutex<Result<String, u16>>,
    calls: AtomicUsize,
}

impl StubSource {
    pub(crate) fn ok(body: &str) -> Self {
        Self {
            response: Mutex::new(Ok(body.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(status: u16) -> Self {
        Self {
            response: Mutex::new(Err(status)),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_ok(&self, body: &str) {
        *self.response.lock().unwrap() = Ok(body.to_string());
    }

    pub(crate) fn set_failing(&self, status: u16) {
        *self.response.lock().unwrap() = Err(status);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteSource for StubSource {
    fn fetch_csv(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<String, TideError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &*self.response.lock().unwrap() {
            Ok(body) => Ok(body.clone()),
            Err(status) => Err(TideError::Status(*status)),
        }
    }
}

/// Render a series the way the ERDDAP server does, units row included.
pub(crate) fn erddap_csv(series: &ObservationSeries) -> String {
    let mut out = format!("time,station_id,{COLUMN}\nUTC,,meters\n");
    for o in series.iter() {
        out.push_str(&format!(
            "{},Dublin Port,{}\n",
            o.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            o.height_m
        ));
    }
    out
}

/// Deterministic uniform noise.
pub(crate) struct Lcg(pub(crate) u64);

impl Lcg {
    pub(crate) fn next_unit(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

pub(crate) fn scenario_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// 2.0 m at 12.42 h plus 0.3 m at 12 h, `t` in hours from [`scenario_start`].
pub(crate) fn scenario_truth(t: f64) -> f64 {
    2.0 * (TAU * t / 12.42).sin() + 0.3 * (TAU * t / 12.0).sin()
}

/// Hourly samples of `f(hours since start)`.
pub(crate) fn hourly_series(days: i64, f: impl Fn(f64) -> f64) -> ObservationSeries {
    let start = scenario_start();
    ObservationSeries::from_unordered(
        (0..days * 24)
            .map(|i| Observation {
                time: start + Duration::hours(i),
                height_m: f(i as f64),
            })
            .collect(),
    )
}

/// Scenario truth plus ±5 cm noise.
pub(crate) fn noisy_scenario(days: i64, seed: u64) -> ObservationSeries {
    let mut rng = Lcg(seed);
    let start = scenario_start();
    ObservationSeries::from_unordered(
        (0..days * 24)
            .map(|i| Observation {
                time: start + Duration::hours(i),
                height_m: scenario_truth(i as f64) + 0.1 * (rng.next_unit() - 0.5),
            })
            .collect(),
    )
}

pub(crate) fn pipeline_settings() -> PipelineSettings {
    PipelineSettings {
        lookback: Duration::days(90),
        reference_latitude: 53.35,
        z_threshold: 3.0,
        fit: FitSettings::default(),
    }
}

/// A service whose caches live in `dir`.
pub(crate) fn service_in(dir: &Path, source: StubSource) -> TideService<StubSource> {
    let store = ObservationStore::new(source, dir.join("data.csv"), COLUMN);
    let lifecycle = ModelLifecycle::new(
        store,
        ModelCache::new(dir.join("tide_model.json")),
        pipeline_settings(),
    );
    TideService::new(lifecycle, Predictor::default())
}
