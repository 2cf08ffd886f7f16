//! # Tide Gauge Observation Fetching and Caching
//!
//! This module supplies the raw water-level record the harmonic fit is built
//! from. It fetches recent gauge readings from an ERDDAP tabledap server and
//! keeps a local CSV copy so the pipeline keeps working while the server is
//! unreachable.
//!
//! ## Data Source
//!
//! ### Irish National Tide Gauge Network (ERDDAP)
//! - **URL**: https://erddap.marine.ie/erddap/tabledap/IrishNationalTideGaugeNetwork.csv
//! - **Station**: configurable (`station.id`, default "Dublin Port")
//! - **Format**: CSV, one header row, one units row, then data rows
//! - **Data**: `time` (ISO-8601, UTC) and the water level column (meters)
//!
//! ### Data Processing Pipeline
//! 1. **Fetch**: HTTP GET for the last `lookback_days` of readings
//! 2. **Parse**: locate the `time` and water level columns by header name
//! 3. **Normalize**: convert every timestamp to UTC, drop rows with missing or
//!    non-numeric heights, sort and de-duplicate
//! 4. **Cache**: rewrite the local CSV with the normalized record
//!
//! ## Fallback Strategy
//!
//! The cache has no TTL. It is the fallback for a failed remote fetch, and the
//! fetch policy decides when it is consulted:
//! - [`FetchPolicy::PreferRemote`]: remote first, cache on failure (reported as
//!   [`DataOrigin::StaleCache`])
//! - [`FetchPolicy::PreferCache`]: cache first, remote if no cache
//! - [`FetchPolicy::RemoteOnly`]: never touch the cache for reading
//! - [`FetchPolicy::CacheOnly`]: never touch the network
//!
//! Transport errors never leave this module: callers see either a series or
//! [`TideError::DataUnavailable`].

use crate::config::{SourceConfig, StationConfig};
use crate::model_cache::write_atomic;
use crate::predictor::assume_utc;
use crate::{Observation, ObservationSeries, TideError};
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::{fs, io};
use tracing::{debug, info, warn};

/// Anything that can return the raw CSV body for a time window.
pub trait RemoteSource: Send + Sync {
    fn fetch_csv(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<String, TideError>;
}

/// Blocking ERDDAP tabledap client for one station.
#[derive(Debug, Clone)]
pub struct ErddapClient {
    client: reqwest::blocking::Client,
    base_url: String,
    station_id: String,
    column: String,
}

impl ErddapClient {
    pub fn new(source: &SourceConfig, station: &StationConfig) -> Result<Self, TideError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(source.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: source.url.clone(),
            station_id: station.id.clone(),
            column: source.water_level_column.clone(),
        })
    }

    /// Build the tabledap query for `[start, end)`.
    ///
    /// ```text
    /// ?time,station_id,Water_Level_LAT&station_id="Dublin Port"&time>=...&time<...
    /// ```
    pub fn query_url(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<reqwest::Url, TideError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| TideError::Parse(format!("invalid source URL {}: {e}", self.base_url)))?;
        let query = format!(
            "time,station_id,{column}&station_id=\"{station}\"&time>={start}&time<{end}",
            column = self.column,
            station = self.station_id,
            start = start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end = end.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        url.set_query(Some(&query));
        Ok(url)
    }
}

impl RemoteSource for ErddapClient {
    fn fetch_csv(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<String, TideError> {
        let url = self.query_url(start, end)?;
        debug!(%url, "requesting observations");

        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(TideError::Status(status.as_u16()));
        }
        Ok(response.text()?)
    }
}

/// Where a fetch is allowed to look, and in which order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    PreferRemote,
    PreferCache,
    RemoteOnly,
    CacheOnly,
}

/// Where the returned series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    /// Fresh download
    Remote,
    /// Local cache, read by choice
    Cache,
    /// Local cache, read because the remote fetch failed
    StaleCache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub series: ObservationSeries,
    pub origin: DataOrigin,
}

/// Remote source plus the local CSV fallback.
#[derive(Debug)]
pub struct ObservationStore<S> {
    source: S,
    cache_path: PathBuf,
    column: String,
}

impl<S: RemoteSource> ObservationStore<S> {
    pub fn new(source: S, cache_path: impl Into<PathBuf>, column: impl Into<String>) -> Self {
        Self {
            source,
            cache_path: cache_path.into(),
            column: column.into(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Fetch the last `lookback` of readings.
    ///
    /// With `allow_remote` the remote source is tried first and the cache is
    /// the fallback; without it only the cache is read.
    pub fn fetch(&self, lookback: Duration, allow_remote: bool) -> Result<Fetched, TideError> {
        let policy = if allow_remote {
            FetchPolicy::PreferRemote
        } else {
            FetchPolicy::CacheOnly
        };
        self.fetch_with(Utc::now(), lookback, policy)
    }

    /// Fetch the window ending at `now` under an explicit policy.
    pub fn fetch_with(
        &self,
        now: DateTime<Utc>,
        lookback: Duration,
        policy: FetchPolicy,
    ) -> Result<Fetched, TideError> {
        match policy {
            FetchPolicy::PreferRemote => match self.fetch_remote(now, lookback) {
                Ok(series) => Ok(Fetched {
                    series,
                    origin: DataOrigin::Remote,
                }),
                Err(remote_err) => {
                    warn!(error = %remote_err, "remote fetch failed, trying local cache");
                    match self.read_cache_logged() {
                        Some(series) => {
                            warn!(rows = series.len(), "using stale cached observations");
                            Ok(Fetched {
                                series,
                                origin: DataOrigin::StaleCache,
                            })
                        }
                        None => Err(TideError::DataUnavailable(format!(
                            "remote fetch failed ({remote_err}) and no usable local cache"
                        ))),
                    }
                }
            },
            FetchPolicy::PreferCache => match self.read_cache_logged() {
                Some(series) => Ok(Fetched {
                    series,
                    origin: DataOrigin::Cache,
                }),
                None => self
                    .fetch_remote(now, lookback)
                    .map(|series| Fetched {
                        series,
                        origin: DataOrigin::Remote,
                    })
                    .map_err(|e| {
                        TideError::DataUnavailable(format!("no local cache and remote fetch failed ({e})"))
                    }),
            },
            FetchPolicy::RemoteOnly => self
                .fetch_remote(now, lookback)
                .map(|series| Fetched {
                    series,
                    origin: DataOrigin::Remote,
                })
                .map_err(|e| TideError::DataUnavailable(format!("remote fetch failed ({e})"))),
            FetchPolicy::CacheOnly => self
                .read_cache_logged()
                .map(|series| Fetched {
                    series,
                    origin: DataOrigin::Cache,
                })
                .ok_or_else(|| TideError::DataUnavailable("no usable local cache".into())),
        }
    }

    fn fetch_remote(&self, now: DateTime<Utc>, lookback: Duration) -> Result<ObservationSeries, TideError> {
        let body = self.source.fetch_csv(now - lookback, now)?;
        let series = parse_csv(&body, &self.column)?;
        if series.is_empty() {
            return Err(TideError::Parse("no observations in the requested window".into()));
        }
        info!(rows = series.len(), "downloaded observations");

        // A failed cache write costs only the fallback, not this fetch
        if let Err(e) = self.write_cache(&series) {
            warn!(error = %e, path = %self.cache_path.display(), "could not write observation cache");
        }
        Ok(series)
    }

    fn read_cache_logged(&self) -> Option<ObservationSeries> {
        match self.read_cache() {
            Ok(Some(series)) if !series.is_empty() => {
                info!(rows = series.len(), path = %self.cache_path.display(), "loaded cached observations");
                Some(series)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, path = %self.cache_path.display(), "observation cache unreadable");
                None
            }
        }
    }

    fn read_cache(&self) -> Result<Option<ObservationSeries>, TideError> {
        match fs::read_to_string(&self.cache_path) {
            Ok(text) => parse_csv(&text, &self.column).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_cache(&self, series: &ObservationSeries) -> io::Result<()> {
        write_atomic(&self.cache_path, to_csv(series, &self.column).as_bytes())
    }
}

/// Parse tabular observations, locating columns by header name.
///
/// Rows whose time or height cannot be parsed are dropped (this includes the
/// ERDDAP units row). Fields are split on bare commas; quoted fields holding
/// commas are not supported.
pub fn parse_csv(text: &str, column: &str) -> Result<ObservationSeries, TideError> {
    let mut lines = text.lines();
    let header = lines
        .next()
        .ok_or_else(|| TideError::Parse("empty response".into()))?;
    let names: Vec<&str> = header.split(',').map(|s| s.trim().trim_matches('"')).collect();

    let find = |name: &str| {
        names
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| TideError::Parse(format!("missing column `{name}` in header `{header}`")))
    };
    let time_idx = find("time")?;
    let height_idx = find(column)?;

    let mut observations = Vec::new();
    let mut dropped = 0usize;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let parsed = fields
            .get(time_idx)
            .and_then(|t| parse_instant(t.trim()))
            .zip(fields.get(height_idx).and_then(|h| h.trim().parse::<f64>().ok()));

        match parsed {
            Some((time, height_m)) if height_m.is_finite() => {
                observations.push(Observation { time, height_m })
            }
            _ => dropped += 1,
        }
    }

    let raw = observations.len();
    let series = ObservationSeries::from_unordered(observations);
    debug!(
        kept = series.len(),
        dropped,
        duplicates = raw - series.len(),
        "parsed observation table"
    );
    Ok(series)
}

/// Parse an instant, normalizing to UTC. Strings without an offset are UTC.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(assume_utc)
}

fn to_csv(series: &ObservationSeries, column: &str) -> String {
    let mut out = String::with_capacity(series.len() * 40);
    let _ = writeln!(out, "time,{column}");
    for o in series.iter() {
        let _ = writeln!(
            out,
            "{},{}",
            o.time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            o.height_m
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::{erddap_csv, StubSource};
    use chrono::TimeZone;
    use tempfile::tempdir;

    const COLUMN: &str = "Water_Level_LAT";

    const ERDDAP_BODY: &str = "\
time,station_id,Water_Level_LAT
UTC,,meters
2025-05-01T00:10:00Z,Dublin Port,2.31
2025-05-01T00:00:00Z,Dublin Port,2.25
2025-05-01T00:05:00Z,Dublin Port,NaN
2025-05-01T00:10:00Z,Dublin Port,2.31
2025-05-01T01:15:00+01:00,Dublin Port,2.40
2025-05-01T00:20:00Z,Dublin Port,
";

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_erddap_body() {
        let series = parse_csv(ERDDAP_BODY, COLUMN).unwrap();
        let times: Vec<_> = series.iter().map(|o| o.time).collect();
        // sorted, de-duplicated, NaN / empty dropped, +01:00 normalized
        assert_eq!(times, vec![t(0, 0), t(0, 10), t(0, 15)]);
        assert_eq!(series.observations()[2].height_m, 2.40);
    }

    #[test]
    fn test_missing_column_is_parse_error() {
        let err = parse_csv("time,station_id,Other\n", COLUMN).unwrap_err();
        assert!(matches!(err, TideError::Parse(_)));
        assert!(matches!(parse_csv("", COLUMN), Err(TideError::Parse(_))));
    }

    #[test]
    fn test_parse_instant_formats() {
        let expected = t(18, 10);
        for s in [
            "2025-05-01T18:10:00Z",
            "2025-05-01T19:10:00+01:00",
            "2025-05-01 18:10:00+00:00",
            "2025-05-01T18:10:00",
            "2025-05-01 18:10:00",
        ] {
            assert_eq!(parse_instant(s), Some(expected), "{s}");
        }
        assert_eq!(parse_instant("UTC"), None);
    }

    #[test]
    fn test_cache_csv_roundtrip() {
        let series = parse_csv(ERDDAP_BODY, COLUMN).unwrap();
        let text = to_csv(&series, COLUMN);
        assert_eq!(parse_csv(&text, COLUMN).unwrap(), series);
    }

    #[test]
    fn test_remote_success_writes_cache() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("data.csv");
        let store = ObservationStore::new(StubSource::ok(ERDDAP_BODY), &cache, COLUMN);

        let fetched = store
            .fetch_with(t(1, 0), Duration::days(90), FetchPolicy::PreferRemote)
            .unwrap();
        assert_eq!(fetched.origin, DataOrigin::Remote);
        assert_eq!(fetched.series.len(), 3);

        let cached = fs::read_to_string(&cache).unwrap();
        assert_eq!(parse_csv(&cached, COLUMN).unwrap(), fetched.series);
    }

    #[test]
    fn test_remote_failure_falls_back_to_cache() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("data.csv");
        let store = ObservationStore::new(StubSource::ok(ERDDAP_BODY), &cache, COLUMN);
        store.fetch(Duration::days(90), true).unwrap();

        store.source().set_failing(503);
        let fetched = store.fetch(Duration::days(90), true).unwrap();
        assert_eq!(fetched.origin, DataOrigin::StaleCache);
        assert_eq!(fetched.series.len(), 3);
    }

    #[test]
    fn test_remote_only_ignores_cache() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("data.csv");
        let store = ObservationStore::new(StubSource::ok(ERDDAP_BODY), &cache, COLUMN);
        store.fetch(Duration::days(90), true).unwrap();

        store.source().set_failing(500);
        let err = store
            .fetch_with(Utc::now(), Duration::days(90), FetchPolicy::RemoteOnly)
            .unwrap_err();
        assert!(matches!(err, TideError::DataUnavailable(_)));
    }

    #[test]
    fn test_nothing_available() {
        let dir = tempdir().unwrap();
        let store = ObservationStore::new(StubSource::failing(404), dir.path().join("data.csv"), COLUMN);
        assert!(matches!(
            store.fetch(Duration::days(90), true),
            Err(TideError::DataUnavailable(_))
        ));
        assert!(matches!(
            store.fetch(Duration::days(90), false),
            Err(TideError::DataUnavailable(_))
        ));
    }

    #[test]
    fn test_prefer_cache_skips_network() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("data.csv");
        let store = ObservationStore::new(StubSource::ok(ERDDAP_BODY), &cache, COLUMN);
        store.fetch(Duration::days(90), true).unwrap();
        assert_eq!(store.source().calls(), 1);

        let fetched = store
            .fetch_with(Utc::now(), Duration::days(90), FetchPolicy::PreferCache)
            .unwrap();
        assert_eq!(fetched.origin, DataOrigin::Cache);
        assert_eq!(store.source().calls(), 1);
    }

    #[test]
    fn test_empty_remote_window_falls_back() {
        let dir = tempdir().unwrap();
        let store = ObservationStore::new(
            StubSource::ok(&erddap_csv(&ObservationSeries::default())),
            dir.path().join("data.csv"),
            COLUMN,
        );
        assert!(matches!(
            store.fetch(Duration::days(90), true),
            Err(TideError::DataUnavailable(_))
        ));
    }

    #[test]
    fn test_query_url_is_encoded() {
        let client = ErddapClient::new(
            &crate::config::Config::default().source,
            &crate::config::Config::default().station,
        )
        .unwrap();
        let url = client.query_url(t(0, 0), t(12, 0)).unwrap();
        let query = url.query().unwrap();
        assert!(query.starts_with("time,station_id,Water_Level_LAT&station_id="));
        assert!(query.contains("%22Dublin%20Port%22"));
        assert!(query.contains("time%3E=2025-05-01T00:00:00Z"));
        assert!(query.contains("time%3C2025-05-01T12:00:00Z"));
    }
}
