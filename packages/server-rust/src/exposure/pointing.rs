//! Sky position and site conditions for an exposure.
//!
//! Pure functions: everything here is computed from snapshots taken when the
//! integration ends, so the same inputs always produce the same fingerprint.

use chrono::{DateTime, Timelike, Utc};

/// Arcseconds per hour of right ascension.
const ARCSEC_PER_RA_HOUR: f64 = 15.0 * 3600.0;
const ARCSEC_PER_DEGREE: f64 = 3600.0;

/// Focuser position at which stars are sharpest.
pub const BEST_FOCUS: i64 = 10_000;
/// Worst seeing multiplier a defocused system reaches.
pub const MAX_SEEING_MULTIPLIER: f64 = 5.0;

/// Where the camera is looking, after all corrections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pointing {
    /// Hours, strictly inside `(0, 24)`.
    pub right_ascension: f64,
    /// Degrees, strictly inside `(-90, 90)`.
    pub declination: f64,
}

impl Pointing {
    /// Right ascension in degrees, as the synthesizer expects.
    #[must_use]
    pub fn right_ascension_degrees(&self) -> f64 {
        self.right_ascension / 24.0 * 360.0
    }
}

/// Corrections configured on the camera.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointingModel {
    /// Fixed offset, arcseconds.
    pub error_ra: f64,
    pub error_dec: f64,
    /// Drift per second of exposure, arcseconds. RA is measured on the sky.
    pub drift_ra: f64,
    pub drift_dec: f64,
}

impl PointingModel {
    /// Applies offset, then drift, then clamps into the synthesizer's valid range.
    #[must_use]
    pub fn apply(&self, right_ascension: f64, declination: f64, duration: f64) -> Pointing {
        let mut ra = right_ascension + self.error_ra / ARCSEC_PER_RA_HOUR;
        let mut dec = declination + self.error_dec / ARCSEC_PER_DEGREE;

        if self.drift_ra != 0.0 || self.drift_dec != 0.0 {
            // An on-sky RA drift spans more hours of RA away from the equator.
            let cos_dec = dec.to_radians().cos().abs().max(1e-6);
            ra += self.drift_ra * duration / ARCSEC_PER_RA_HOUR / cos_dec;
            dec += self.drift_dec * duration / ARCSEC_PER_DEGREE;
        }

        clamp(ra, dec)
    }
}

/// Pulls coordinates off the poles and away from the RA wrap point.
#[must_use]
pub fn clamp(right_ascension: f64, declination: f64) -> Pointing {
    let right_ascension = if right_ascension <= 0.0 {
        0.01
    } else if right_ascension >= 24.0 {
        23.99
    } else {
        right_ascension
    };
    let declination = if declination >= 90.0 {
        89.99
    } else if declination <= -90.0 {
        -89.99
    } else {
        declination
    };
    Pointing {
        right_ascension,
        declination,
    }
}

/// Whether local mean solar time at `longitude` (degrees east) is in `[06:00, 18:00)`.
#[must_use]
pub fn is_sunlit(now: DateTime<Utc>, longitude: f64) -> bool {
    let utc_hours = f64::from(now.hour())
        + f64::from(now.minute()) / 60.0
        + f64::from(now.second()) / 3600.0;
    let local = (utc_hours + longitude / 15.0).rem_euclid(24.0);
    (6.0..18.0).contains(&local)
}

/// Seeing multiplier from focus error, capped at [`MAX_SEEING_MULTIPLIER`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn seeing_multiplier(focus: i64) -> f64 {
    let offset = focus.saturating_sub(BEST_FOCUS).unsigned_abs() as f64;
    (1.0 + offset / 100.0).min(MAX_SEEING_MULTIPLIER)
}

/// Dark current in e-/pixel/s; doubles every 6 °C above -10 °C.
#[must_use]
pub fn dark_current(ccd_temperature: f64) -> f64 {
    0.2 * 2f64.powf((ccd_temperature + 10.0) / 6.0)
}
