//! # Model Lifecycle
//!
//! Decides when to load the cached model and when to fit a new one.
//!
//! ## States
//!
//! - **Cached**: the model on disk is current. `get_model` loads it once and
//!   keeps it in memory.
//! - **Stale**: a rebuild was requested. The next `get_model` refits.
//!
//! A missing cache file is handled as a one-shot fit (fetch, filter, fit,
//! save) that ends in **Cached**. Staleness is never inferred from file age.
//!
//! ## Rebuild
//!
//! `rebuild` forces a remote download (no cached observations), fits and saves.
//! Fits are serialized by a mutex, and the model file is replaced atomically
//! only after a successful fit, so a failed rebuild leaves the previous model
//! loadable and unchanged.

use crate::config::{Config, DEFAULT_LOOKBACK_DAYS};
use crate::harmonic::{self, FitSettings, TidalModel};
use crate::model_cache::ModelCache;
use crate::outliers;
use crate::predictor::Predictor;
use crate::tide_data::{DataOrigin, ErddapClient, FetchPolicy, ObservationStore, RemoteSource};
use crate::{TideCurve, TideError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Inputs to the fetch → filter → fit sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub lookback: Duration,
    pub reference_latitude: f64,
    pub z_threshold: f64,
    pub fit: FitSettings,
}

impl PipelineSettings {
    /// A lookback that is not a positive, representable number of days falls
    /// back to [`DEFAULT_LOOKBACK_DAYS`].
    pub fn from_config(config: &Config) -> Self {
        let lookback_days = config.source.lookback_days;
        let lookback = Duration::try_days(lookback_days)
            .filter(|d| *d > Duration::zero())
            .unwrap_or_else(|| {
                warn!(
                    lookback_days,
                    default = DEFAULT_LOOKBACK_DAYS,
                    "lookback out of range, using default"
                );
                Duration::days(DEFAULT_LOOKBACK_DAYS)
            });
        Self {
            lookback,
            reference_latitude: config.station.latitude,
            z_threshold: config.model.outlier_z_threshold,
            fit: FitSettings {
                rayleigh_min: config.model.rayleigh_min,
                nodal: config.model.nodal,
                trend: config.model.trend,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Cached,
    Stale,
}

#[derive(Debug)]
struct Inner {
    state: ModelState,
    loaded: Option<Arc<TidalModel>>,
}

/// Orchestrates the observation store, fitter and model cache.
#[derive(Debug)]
pub struct ModelLifecycle<S> {
    store: ObservationStore<S>,
    cache: ModelCache,
    settings: PipelineSettings,
    inner: Mutex<Inner>,
    /// Held for the whole fetch + fit + save sequence
    fit_lock: Mutex<()>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: RemoteSource> ModelLifecycle<S> {
    pub fn new(store: ObservationStore<S>, cache: ModelCache, settings: PipelineSettings) -> Self {
        Self {
            store,
            cache,
            settings,
            inner: Mutex::new(Inner {
                state: ModelState::Cached,
                loaded: None,
            }),
            fit_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &ObservationStore<S> {
        &self.store
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn state(&self) -> ModelState {
        lock(&self.inner).state
    }

    /// Request a refit on the next `get_model`.
    pub fn invalidate(&self) {
        let mut inner = lock(&self.inner);
        inner.state = ModelState::Stale;
        info!("model marked stale");
    }

    /// Return the current model, loading or fitting it as needed.
    ///
    /// Errors are `DataUnavailable` (no observations to fit) or `FitFailure`.
    /// A stale model whose refit fails falls back to the cached model, which
    /// becomes current again; only `rebuild` retries the fit after that.
    pub fn get_model(&self) -> Result<Arc<TidalModel>, TideError> {
        let _fit_guard = lock(&self.fit_lock);

        let state = {
            let inner = lock(&self.inner);
            if let (ModelState::Cached, Some(model)) = (inner.state, &inner.loaded) {
                return Ok(Arc::clone(model));
            }
            inner.state
        };

        if state == ModelState::Cached {
            match self.cache.load() {
                Ok(Some(model)) => {
                    info!(path = %self.cache.path().display(), "loaded cached harmonic model");
                    return Ok(self.install(model));
                }
                Ok(None) => info!("no cached model, fitting from observations"),
                Err(e) => warn!(error = %e, "cached model unreadable, refitting"),
            }
        }

        match self.fit_and_save(FetchPolicy::PreferRemote) {
            Ok(model) => Ok(self.install(model)),
            Err(e) if state == ModelState::Stale => {
                warn!(error = %e, "refit of stale model failed, using cached model");
                // Serve the cached model until an explicit rebuild succeeds
                match self.cache.load() {
                    Ok(Some(model)) => Ok(self.install(model)),
                    _ => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Download fresh observations, refit and replace the cached model.
    ///
    /// Returns `false` on any failure; the previous model stays in place.
    pub fn rebuild(&self) -> bool {
        let _fit_guard = lock(&self.fit_lock);

        let previous = {
            let mut inner = lock(&self.inner);
            std::mem::replace(&mut inner.state, ModelState::Stale)
        };
        info!("rebuilding harmonic model from fresh observations");

        match self.fit_and_save(FetchPolicy::RemoteOnly) {
            Ok(model) => {
                self.install(model);
                info!("model rebuilt");
                true
            }
            Err(e) => {
                warn!(error = %e, "model rebuild failed, keeping previous model");
                lock(&self.inner).state = previous;
                false
            }
        }
    }

    fn install(&self, model: TidalModel) -> Arc<TidalModel> {
        let model = Arc::new(model);
        let mut inner = lock(&self.inner);
        inner.state = ModelState::Cached;
        inner.loaded = Some(Arc::clone(&model));
        model
    }

    /// Fetch, filter, fit, save. Filtering always precedes fitting.
    fn fit_and_save(&self, policy: FetchPolicy) -> Result<TidalModel, TideError> {
        let fetched = self
            .store
            .fetch_with(Utc::now(), self.settings.lookback, policy)?;
        if fetched.origin == DataOrigin::StaleCache {
            warn!("fitting from stale cached observations");
        }

        let cleaned = outliers::filter(&fetched.series, self.settings.z_threshold);
        let model = harmonic::fit(&cleaned, self.settings.reference_latitude, &self.settings.fit)?;
        self.cache.save(&model)?;
        Ok(model)
    }
}

/// The two-call surface the chat front end uses, plus a curve helper.
#[derive(Debug)]
pub struct TideService<S = ErddapClient> {
    lifecycle: ModelLifecycle<S>,
    predictor: Predictor,
}

impl TideService<ErddapClient> {
    /// Wire up the ERDDAP client, caches and model settings from configuration.
    pub fn from_config(config: &Config) -> Result<Self, TideError> {
        let client = ErddapClient::new(&config.source, &config.station)?;
        let store = ObservationStore::new(
            client,
            &config.cache.data_file,
            &config.source.water_level_column,
        );
        let lifecycle = ModelLifecycle::new(
            store,
            ModelCache::new(&config.cache.model_file),
            PipelineSettings::from_config(config),
        );
        Ok(Self::new(lifecycle, Predictor::new(config.model.gauge_lag_minutes)))
    }
}

impl<S: RemoteSource> TideService<S> {
    pub fn new(lifecycle: ModelLifecycle<S>, predictor: Predictor) -> Self {
        Self {
            lifecycle,
            predictor,
        }
    }

    pub fn lifecycle(&self) -> &ModelLifecycle<S> {
        &self.lifecycle
    }

    /// Predicted height in meters at one instant.
    pub fn predict_tide<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> Result<f64, TideError> {
        let model = self.lifecycle.get_model()?;
        Ok(self.predictor.height_at(&model, at))
    }

    /// Predicted heights in meters, one per instant, in input order.
    pub fn predict_tides<Tz: TimeZone>(&self, times: &[DateTime<Tz>]) -> Result<Vec<f64>, TideError> {
        let model = self.lifecycle.get_model()?;
        Ok(self.predictor.predict(&model, times))
    }

    /// Refit from fresh observations; `false` means the old model is still in use.
    pub fn rebuild_model(&self) -> bool {
        self.lifecycle.rebuild()
    }

    /// Predicted curve of ±`half_window_hours` around `center` every `step_minutes`.
    pub fn curve<Tz: TimeZone>(
        &self,
        center: &DateTime<Tz>,
        half_window_hours: i64,
        step_minutes: i64,
    ) -> Result<TideCurve, TideError> {
        let model = self.lifecycle.get_model()?;
        Ok(self.predictor.curve(
            &model,
            center,
            Duration::hours(half_window_hours),
            Duration::minutes(step_minutes),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let settings = PipelineSettings::from_config(&Config::default());
        assert_eq!(settings.lookback, Duration::days(90));
        assert_eq!(settings.reference_latitude, 53.35);
        assert_eq!(settings.fit, FitSettings::default());
    }

    #[test]
    fn test_unusable_lookback_uses_default() {
        let mut config = Config::default();
        for days in [i64::MAX, i64::MIN, 0, -5] {
            config.source.lookback_days = days;
            let settings = PipelineSettings::from_config(&config);
            assert_eq!(settings.lookback, Duration::days(DEFAULT_LOOKBACK_DAYS), "{days}");
        }
        config.source.lookback_days = 30;
        assert_eq!(PipelineSettings::from_config(&config).lookback, Duration::days(30));
    }
}
