//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the tide-config.toml file.
//! It centralizes the station identity, the remote data source, model tuning
//! constants and cache file locations.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Days of history requested when the configured lookback is unusable.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 90;

/// Application configuration loaded from tide-config.toml
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Tide gauge station
    pub station: StationConfig,
    /// Remote observation source
    pub source: SourceConfig,
    /// Harmonic model tuning
    pub model: ModelConfig,
    /// Local cache files
    pub cache: CacheConfig,
}

/// Tide gauge station configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StationConfig {
    /// Station identifier as the remote source knows it
    pub id: String,
    /// Human-readable station name for reference
    pub name: String,
    /// Latitude in degrees, used as the reference latitude for nodal corrections
    pub latitude: f64,
}

/// ERDDAP tabledap source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Tabledap CSV endpoint
    pub url: String,
    /// Column holding the water level in meters
    pub water_level_column: String,
    /// How many days of history to request
    pub lookback_days: i64,
    /// Network timeout in seconds
    pub timeout_secs: u64,
}

/// Harmonic model tuning.
///
/// These values were chosen empirically against the Dublin Port record and
/// should not change without evidence from a re-validation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Samples with |z| strictly above this are dropped before fitting
    pub outlier_z_threshold: f64,
    /// Minimum Rayleigh ratio for a constituent to be resolved
    pub rayleigh_min: f64,
    /// Apply 18.6-year nodal amplitude/phase corrections
    pub nodal: bool,
    /// Fit a linear trend term
    pub trend: bool,
    /// Added to every query instant to account for tide-gauge clock lag
    pub gauge_lag_minutes: i64,
}

/// Cache file locations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Cleaned observation record (CSV)
    pub data_file: PathBuf,
    /// Serialized model coefficients (JSON)
    pub model_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            station: StationConfig {
                id: "Dublin Port".to_string(),
                name: "Dublin Port".to_string(),
                latitude: 53.35,
            },
            source: SourceConfig {
                url: "https://erddap.marine.ie/erddap/tabledap/IrishNationalTideGaugeNetwork.csv"
                    .to_string(),
                water_level_column: "Water_Level_LAT".to_string(),
                lookback_days: DEFAULT_LOOKBACK_DAYS,
                timeout_secs: 10,
            },
            model: ModelConfig::default(),
            cache: CacheConfig {
                data_file: PathBuf::from("data.csv"),
                model_file: PathBuf::from("tide_model.json"),
            },
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            outlier_z_threshold: 3.0,
            rayleigh_min: 0.95,
            nodal: true,
            trend: true,
            gauge_lag_minutes: 6,
        }
    }
}

impl Config {
    /// Load configuration from tide-config.toml file
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path("tide-config.toml")
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(station = %config.station.name, "loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(error = %e, "invalid config file format, using defaults (Dublin Port)");
                    Self::default()
                }
            },
            Err(_) => {
                info!("no config file found, using defaults (Dublin Port)");
                Self::default()
            }
        }
    }

    /// Save current configuration to the given path
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.station.id, "Dublin Port");
        assert_eq!(config.station.latitude, 53.35);
        assert_eq!(config.source.lookback_days, 90);
        assert_eq!(config.source.timeout_secs, 10);
        assert_eq!(config.model.outlier_z_threshold, 3.0);
        assert_eq!(config.model.rayleigh_min, 0.95);
        assert_eq!(config.model.gauge_lag_minutes, 6);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.station.id, parsed.station.id);
        assert_eq!(config.source.url, parsed.source.url);
        assert_eq!(config.cache.model_file, parsed.cache.model_file);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        // Should fallback to default
        assert_eq!(config.station.id, "Dublin Port");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tide-config.toml");

        let mut config = Config::default();
        config.station.name = "Howth Harbour".to_string();
        config.model.gauge_lag_minutes = 0;
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path);
        assert_eq!(loaded.station.name, "Howth Harbour");
        assert_eq!(loaded.model.gauge_lag_minutes, 0);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tide-config.toml");
        fs::write(&path, "station = 12").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.station.id, "Dublin Port");
    }
}
