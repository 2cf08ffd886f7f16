//! # Tidal Constituents
//!
//! Standard constituent table, nodal (18.6-year) corrections and the Rayleigh
//! selection rule that decides which constituents a record can resolve.
//!
//! ## Harmonic argument
//!
//! Each constituent is defined by its Doodson numbers `[τ, s, h, p, N′, p₁]`
//! and an equilibrium phase offset in cycles. Its equilibrium argument is
//!
//! ```text
//! V(t) = Σ dᵢ · argᵢ(t) + 360° · offset
//! ```
//!
//! and the observed contribution is `f(t) · A · cos(V(t) + u(t) − g)` where
//! `f`, `u` are the nodal amplitude factor and phase shift and `A`, `g` the
//! fitted amplitude and Greenwich phase.
//!
//! ## Nodal corrections
//!
//! The major lunar families (M2, K1, O1, K2) sum their satellite lines
//! (Foreman, *Manual for Tidal Heights Analysis and Prediction*, 1977):
//!
//! ```text
//! f · e^{iu} = 1 + Σₖ rₖ · e^{i(Δpₖ·p + ΔN′ₖ·N′ + Δp₁ₖ·p₁ + 360°·φₖ)}
//! ```
//!
//! Satellites that come from the third-degree potential have their amplitude
//! ratio scaled by the station latitude φ:
//! `0.36309 (1 − 5 sin²φ) / sin φ` for diurnal lines and `2.59808 sin φ` for
//! semidiurnal lines. The remaining bases use closed-form expressions in the
//! node longitude N (Schureman, table 14; Pugh, table 4.3).
//! Constituents without a tabulated expression borrow the factors of their
//! parent: `f` multiplies as `f^|k|` and `u` adds as `k·u`.

use crate::astro::{self, AstronomicalArguments};
use serde::{Deserialize, Serialize};

/// Latitudes closer to the equator than this (degrees) are clamped before the
/// diurnal latitude factor, which divides by `sin φ`.
pub const MIN_ABS_LATITUDE: f64 = 5.0;

/// Constituents whose nodal expressions are tabulated directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodalBase {
    M2,
    M3,
    K1,
    O1,
    K2,
    J1,
    OO1,
    Mf,
    Mm,
}

/// One factor in a constituent's nodal correction: `f_base^|power|`, `power · u_base`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodalTerm {
    pub base: NodalBase,
    pub power: i8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LatitudeScale {
    Fixed,
    Diurnal,
    Semidiurnal,
}

impl LatitudeScale {
    fn factor(self, sin_lat: f64) -> f64 {
        match self {
            LatitudeScale::Fixed => 1.0,
            LatitudeScale::Diurnal => 0.36309 * (1.0 - 5.0 * sin_lat * sin_lat) / sin_lat,
            LatitudeScale::Semidiurnal => 2.59808 * sin_lat,
        }
    }
}

/// A satellite line: increments on `[p, N′, p₁]`, phase in cycles and
/// amplitude relative to the main line.
#[derive(Clone, Copy, Debug)]
struct Satellite {
    delta: [i8; 3],
    phase: f64,
    ratio: f64,
    scale: LatitudeScale,
}

const fn sat(delta: [i8; 3], phase: f64, ratio: f64, scale: LatitudeScale) -> Satellite {
    Satellite {
        delta,
        phase,
        ratio,
        scale,
    }
}

use LatitudeScale::{Diurnal as R1, Fixed as R0, Semidiurnal as R2};

const M2_SATELLITES: &[Satellite] = &[
    sat([-1, -1, 0], 0.75, 0.0001, R2),
    sat([-1, 0, 0], 0.75, 0.0004, R2),
    sat([0, -2, 0], 0.0, 0.0005, R0),
    sat([0, -1, 0], 0.5, 0.0373, R0),
    sat([1, -1, 0], 0.25, 0.0001, R2),
    sat([1, 0, 0], 0.75, 0.0009, R2),
    sat([1, 1, 0], 0.75, 0.0002, R2),
    sat([2, 0, 0], 0.0, 0.0006, R0),
    sat([2, 1, 0], 0.0, 0.0002, R0),
];

const K1_SATELLITES: &[Satellite] = &[
    sat([-2, -1, 0], 0.0, 0.0002, R0),
    sat([-1, -1, 0], 0.75, 0.0001, R1),
    sat([-1, 0, 0], 0.75, 0.0007, R1),
    sat([-1, 1, 0], 0.75, 0.0001, R1),
    sat([0, -2, 0], 0.0, 0.0001, R0),
    sat([0, -1, 0], 0.5, 0.0198, R0),
    sat([0, 1, 0], 0.0, 0.1356, R0),
    sat([0, 2, 0], 0.5, 0.0029, R0),
    sat([1, 0, 0], 0.25, 0.0002, R1),
    sat([1, 1, 0], 0.25, 0.0001, R1),
];

const O1_SATELLITES: &[Satellite] = &[
    sat([-1, 0, 0], 0.75, 0.0003, R1),
    sat([0, -2, 0], 0.5, 0.0058, R0),
    sat([0, -1, 0], 0.0, 0.1885, R0),
    sat([1, -1, 0], 0.25, 0.0004, R1),
    sat([1, 0, 0], 0.75, 0.0029, R1),
    sat([1, 1, 0], 0.75, 0.0004, R1),
    sat([2, 0, 0], 0.5, 0.0064, R0),
    sat([2, 1, 0], 0.5, 0.0010, R0),
];

const K2_SATELLITES: &[Satellite] = &[
    sat([-1, 0, 0], 0.75, 0.0024, R2),
    sat([-1, 1, 0], 0.75, 0.0004, R2),
    sat([0, -1, 0], 0.5, 0.0128, R0),
    sat([0, 1, 0], 0.0, 0.2980, R0),
    sat([0, 2, 0], 0.0, 0.0324, R0),
];

fn clamp_latitude(latitude: f64) -> f64 {
    if latitude.abs() < MIN_ABS_LATITUDE {
        MIN_ABS_LATITUDE.copysign(latitude)
    } else {
        latitude
    }
}

/// `(f, u_deg)` from a satellite sum.
fn satellite_factors(satellites: &[Satellite], astro: &AstronomicalArguments, latitude: f64) -> (f64, f64) {
    let [_, _, _, p, n_prime, p1] = astro.doodson_order();
    let sin_lat = clamp_latitude(latitude).to_radians().sin();

    let (re, im) = satellites.iter().fold((1.0, 0.0), |(re, im), sat| {
        let r = sat.ratio * sat.scale.factor(sin_lat);
        let angle = (f64::from(sat.delta[0]) * p
            + f64::from(sat.delta[1]) * n_prime
            + f64::from(sat.delta[2]) * p1
            + 360.0 * sat.phase)
            .to_radians();
        (re + r * angle.cos(), im + r * angle.sin())
    });
    (re.hypot(im), im.atan2(re).to_degrees())
}

impl NodalBase {
    /// Amplitude factor `f` and phase correction `u` (degrees) at an instant,
    /// for a station at `latitude` degrees.
    pub fn factors(self, astro: &AstronomicalArguments, latitude: f64) -> (f64, f64) {
        let n = astro.n.to_radians();
        let (c1, c2, c3) = (n.cos(), (2.0 * n).cos(), (3.0 * n).cos());
        let (s1, s2, s3) = (n.sin(), (2.0 * n).sin(), (3.0 * n).sin());
        match self {
            NodalBase::M2 => satellite_factors(M2_SATELLITES, astro, latitude),
            NodalBase::M3 => {
                let (f, u) = NodalBase::M2.factors(astro, latitude);
                (f.powf(1.5), 1.5 * u)
            }
            NodalBase::K1 => satellite_factors(K1_SATELLITES, astro, latitude),
            NodalBase::O1 => satellite_factors(O1_SATELLITES, astro, latitude),
            NodalBase::K2 => satellite_factors(K2_SATELLITES, astro, latitude),
            NodalBase::J1 => (
                1.0129 + 0.1676 * c1 - 0.0170 * c2 + 0.0016 * c3,
                -12.94 * s1 + 1.34 * s2 - 0.19 * s3,
            ),
            NodalBase::OO1 => (
                1.1027 + 0.6504 * c1 + 0.0317 * c2 - 0.0014 * c3,
                -36.68 * s1 + 4.02 * s2 - 0.57 * s3,
            ),
            NodalBase::Mf => (
                1.0430 + 0.4135 * c1 - 0.0040 * c2,
                -23.74 * s1 + 2.68 * s2 - 0.38 * s3,
            ),
            NodalBase::Mm => (1.0000 - 0.1300 * c1 + 0.0013 * c2, 0.0),
        }
    }
}

/// Combined `(f, u_deg)` for a list of nodal terms. An empty list means no modulation.
pub fn nodal_factors(terms: &[NodalTerm], astro: &AstronomicalArguments, latitude: f64) -> (f64, f64) {
    terms.iter().fold((1.0, 0.0), |(f, u), term| {
        let (fb, ub) = term.base.factors(astro, latitude);
        (
            f * fb.powi(i32::from(term.power.unsigned_abs())),
            u + f64::from(term.power) * ub,
        )
    })
}

/// Nodal factor and total argument (radians) of a constituent at one instant.
///
/// With `apply_nodal == false` the factor is 1 and no phase correction is added.
pub fn harmonic_argument(
    doodson: &[i8; 6],
    offset_cycles: f64,
    nodal: &[NodalTerm],
    astro: &AstronomicalArguments,
    latitude: f64,
    apply_nodal: bool,
) -> (f64, f64) {
    let v: f64 = doodson
        .iter()
        .zip(astro.doodson_order())
        .map(|(&d, arg)| f64::from(d) * arg)
        .sum::<f64>()
        + 360.0 * offset_cycles;

    let (f, u) = if apply_nodal {
        nodal_factors(nodal, astro, latitude)
    } else {
        (1.0, 0.0)
    };

    (f, (v + u).rem_euclid(360.0).to_radians())
}

/// Frequency in cycles per hour for a set of Doodson numbers.
pub fn frequency_cph(doodson: &[i8; 6]) -> f64 {
    doodson
        .iter()
        .zip(astro::doodson_rates())
        .map(|(&d, rate)| f64::from(d) * rate)
        .sum::<f64>()
        / 360.0
}

/// A standard tidal constituent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constituent {
    pub name: &'static str,
    pub doodson: [i8; 6],
    /// Equilibrium phase offset in cycles
    pub offset: f64,
    pub nodal: &'static [NodalTerm],
}

impl Constituent {
    pub fn frequency_cph(&self) -> f64 {
        frequency_cph(&self.doodson)
    }

    pub fn period_hours(&self) -> f64 {
        1.0 / self.frequency_cph()
    }

    pub fn argument(
        &self,
        astro: &AstronomicalArguments,
        latitude: f64,
        apply_nodal: bool,
    ) -> (f64, f64) {
        harmonic_argument(&self.doodson, self.offset, self.nodal, astro, latitude, apply_nodal)
    }
}

const fn term(base: NodalBase, power: i8) -> NodalTerm {
    NodalTerm { base, power }
}

const NONE: &[NodalTerm] = &[];
const M2: &[NodalTerm] = &[term(NodalBase::M2, 1)];
const M2_2: &[NodalTerm] = &[term(NodalBase::M2, 2)];
const M2_3: &[NodalTerm] = &[term(NodalBase::M2, 3)];
const M2_4: &[NodalTerm] = &[term(NodalBase::M2, 4)];
const O1: &[NodalTerm] = &[term(NodalBase::O1, 1)];
const K1: &[NodalTerm] = &[term(NodalBase::K1, 1)];
const K2: &[NodalTerm] = &[term(NodalBase::K2, 1)];
const J1: &[NodalTerm] = &[term(NodalBase::J1, 1)];
const OO1: &[NodalTerm] = &[term(NodalBase::OO1, 1)];
const M3: &[NodalTerm] = &[term(NodalBase::M3, 1)];
const MF: &[NodalTerm] = &[term(NodalBase::Mf, 1)];
const MM: &[NodalTerm] = &[term(NodalBase::Mm, 1)];
const MSF: &[NodalTerm] = &[term(NodalBase::M2, -1)];
const MK3: &[NodalTerm] = &[term(NodalBase::M2, 1), term(NodalBase::K1, 1)];
const MO3: &[NodalTerm] = &[term(NodalBase::M2, 1), term(NodalBase::O1, 1)];

const fn c(name: &'static str, doodson: [i8; 6], offset: f64, nodal: &'static [NodalTerm]) -> Constituent {
    Constituent {
        name,
        doodson,
        offset,
        nodal,
    }
}

/// Candidate constituents in selection priority order (largest typical
/// amplitude first). Rayleigh selection walks this list front to back, so a
/// constituent too close to one listed earlier is dropped.
pub const CONSTITUENTS: &[Constituent] = &[
    c("M2", [2, 0, 0, 0, 0, 0], 0.0, M2),
    c("S2", [2, 2, -2, 0, 0, 0], 0.0, NONE),
    c("K1", [1, 1, 0, 0, 0, 0], 0.25, K1),
    c("O1", [1, -1, 0, 0, 0, 0], -0.25, O1),
    c("N2", [2, -1, 0, 1, 0, 0], 0.0, M2),
    c("K2", [2, 2, 0, 0, 0, 0], 0.0, K2),
    c("P1", [1, 1, -2, 0, 0, 0], -0.25, NONE),
    c("Q1", [1, -2, 0, 1, 0, 0], -0.25, O1),
    c("M4", [4, 0, 0, 0, 0, 0], 0.0, M2_2),
    c("MS4", [4, 2, -2, 0, 0, 0], 0.0, M2),
    c("MN4", [4, -1, 0, 1, 0, 0], 0.0, M2_2),
    c("M6", [6, 0, 0, 0, 0, 0], 0.0, M2_3),
    c("MF", [0, 2, 0, 0, 0, 0], 0.0, MF),
    c("MM", [0, 1, 0, -1, 0, 0], 0.0, MM),
    c("MSF", [0, 2, -2, 0, 0, 0], 0.0, MSF),
    c("MK3", [3, 1, 0, 0, 0, 0], 0.25, MK3),
    c("MO3", [3, -1, 0, 0, 0, 0], -0.25, MO3),
    c("2N2", [2, -2, 0, 2, 0, 0], 0.0, M2),
    c("MU2", [2, -2, 2, 0, 0, 0], 0.0, M2),
    c("NU2", [2, -1, 2, -1, 0, 0], 0.0, M2),
    c("L2", [2, 1, 0, -1, 0, 0], 0.5, M2),
    c("T2", [2, 2, -3, 0, 0, 1], 0.0, NONE),
    c("J1", [1, 2, 0, -1, 0, 0], 0.25, J1),
    c("OO1", [1, 3, 0, 0, 0, 0], 0.25, OO1),
    c("RHO1", [1, -2, 2, -1, 0, 0], -0.25, O1),
    c("2Q1", [1, -3, 0, 2, 0, 0], -0.25, O1),
    c("M3", [3, 0, 0, 0, 0, 0], 0.5, M3),
    c("SK3", [3, 3, -2, 0, 0, 0], 0.25, K1),
    c("S4", [4, 4, -4, 0, 0, 0], 0.0, NONE),
    c("2MS6", [6, 2, -2, 0, 0, 0], 0.0, M2_2),
    c("M8", [8, 0, 0, 0, 0, 0], 0.0, M2_4),
];

/// Look up a constituent by name.
pub fn by_name(name: &str) -> Option<&'static Constituent> {
    CONSTITUENTS.iter().find(|c| c.name == name)
}

/// Pick the constituents a record of `span_hours` can resolve.
///
/// A candidate is kept when its frequency separation from zero (the mean and
/// trend terms) and from every constituent already kept is at least
/// `rayleigh_min / span_hours`. The result is sorted by frequency.
pub fn select(span_hours: f64, rayleigh_min: f64) -> Vec<&'static Constituent> {
    if span_hours.is_nan() || span_hours <= 0.0 {
        return Vec::new();
    }
    let min_separation = rayleigh_min / span_hours;

    let mut selected: Vec<&'static Constituent> = Vec::new();
    for candidate in CONSTITUENTS {
        let freq = candidate.frequency_cph();
        if freq < min_separation {
            continue;
        }
        if selected
            .iter()
            .all(|kept| (kept.frequency_cph() - freq).abs() >= min_separation)
        {
            selected.push(candidate);
        }
    }

    selected.sort_by(|a, b| a.frequency_cph().total_cmp(&b.frequency_cph()));
    selected
}
