//! Mean astronomical arguments for tidal harmonic analysis.
//!
//! Linear-in-time mean longitudes (Meeus, *Astronomical Algorithms* ch. 47/25,
//! truncated to the secular rate), combined into Doodson's six fundamental
//! arguments. Accuracy: a few hundredths of a degree over a century, far below
//! what a 90-day harmonic fit can resolve.
//!
//! All angles are in degrees, all rates in degrees per hour. Time is counted
//! from J2000.0 (2000-01-01 12:00 UTC); the difference between UT and TT is
//! ignored.

use chrono::{DateTime, Utc};

/// J2000.0 epoch as milliseconds since the Unix epoch.
const J2000_UNIX_MS: i64 = 946_728_000_000;
const MS_PER_DAY: f64 = 86_400_000.0;
const HOURS_PER_CENTURY: f64 = 36_525.0 * 24.0;

// Mean longitude at J2000.0 (deg) and secular rate (deg / Julian century)
const MOON: (f64, f64) = (218.3164, 481_267.8812);
const SUN: (f64, f64) = (280.4661, 36_000.7698);
const LUNAR_PERIGEE: (f64, f64) = (83.3535, 4_069.0137);
const LUNAR_NODE: (f64, f64) = (125.0445, -1_934.1363);
const SOLAR_PERIGEE: (f64, f64) = (282.9384, 1.7195);

/// Doodson's fundamental arguments at one instant, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AstronomicalArguments {
    /// Mean lunar time (τ), zero at lower transit of the mean moon
    pub tau: f64,
    /// Mean longitude of the Moon (s)
    pub s: f64,
    /// Mean longitude of the Sun (h)
    pub h: f64,
    /// Longitude of lunar perigee (p)
    pub p: f64,
    /// Longitude of the ascending lunar node (N)
    pub n: f64,
    /// Longitude of solar perigee (p₁)
    pub p1: f64,
}

impl AstronomicalArguments {
    /// Arguments in Doodson order `[τ, s, h, p, N′, p₁]`, with `N′ = −N`.
    pub fn doodson_order(&self) -> [f64; 6] {
        [self.tau, self.s, self.h, self.p, -self.n, self.p1]
    }
}

/// Rates of `[τ, s, h, p, N′, p₁]` in degrees per hour.
///
/// Derived from the same polynomials as [`arguments`], so a frequency built
/// from these rates is exactly the derivative of the phase used at fit time.
pub fn doodson_rates() -> [f64; 6] {
    let s = MOON.1 / HOURS_PER_CENTURY;
    let h = SUN.1 / HOURS_PER_CENTURY;
    let p = LUNAR_PERIGEE.1 / HOURS_PER_CENTURY;
    let n = LUNAR_NODE.1 / HOURS_PER_CENTURY;
    let p1 = SOLAR_PERIGEE.1 / HOURS_PER_CENTURY;
    [15.0 + h - s, s, h, p, -n, p1]
}

/// Compute the fundamental arguments for an instant.
pub fn arguments(at: DateTime<Utc>) -> AstronomicalArguments {
    let days = (at.timestamp_millis() - J2000_UNIX_MS) as f64 / MS_PER_DAY;
    let centuries = days / 36_525.0;

    let lon = |(l0, rate): (f64, f64)| (l0 + rate * centuries).rem_euclid(360.0);
    let s = lon(MOON);
    let h = lon(SUN);

    // Hour angle of the mean sun: J2000.0 is Greenwich noon, so the
    // fractional day is zero when the mean sun transits.
    let solar_angle = 360.0 * days.rem_euclid(1.0);

    AstronomicalArguments {
        // Doodson counts τ from lower transit
        tau: (180.0 + solar_angle + h - s).rem_euclid(360.0),
        s,
        h,
        p: lon(LUNAR_PERIGEE),
        n: lon(LUNAR_NODE),
        p1: lon(SOLAR_PERIGEE),
    }
}
