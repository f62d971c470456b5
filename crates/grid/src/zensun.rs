//! Solar position model for radiation averaging.
//!
//! NOAA products report shortwave and diffuse radiation as instantaneous
//! values, while the store keeps interval-averaged values. The conversion
//! factor is the ratio of the mean cosine of the solar zenith angle over
//! the preceding interval to its instantaneous value at the valid time.
//!
//! Declination and equation of time use the Spencer Fourier series; the
//! backward mean is integrated analytically with the night part clipped
//! at the horizon.

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::griddef::GridDef;

/// Angular speed of the hour angle, radians per second.
const EARTH_ROTATION: f64 = 2.0 * PI / 86400.0;

/// Solar ephemeris for one instant, valid for any location.
#[derive(Debug, Clone, Copy)]
pub struct SolarPosition {
    /// Solar declination in radians.
    pub declination: f64,
    /// Equation of time in minutes.
    pub equation_of_time: f64,
    /// UTC minutes since midnight.
    minutes_of_day: f64,
}

impl SolarPosition {
    pub fn new(time: DateTime<Utc>) -> Self {
        let fractional_hour =
            time.hour() as f64 + time.minute() as f64 / 60.0 + time.second() as f64 / 3600.0;
        // Spencer (1971) fractional year, radians.
        let t = 2.0 * PI * (time.ordinal() as f64 - 1.0 + (fractional_hour - 12.0) / 24.0) / 365.0;

        let declination = 0.006918 - 0.399912 * t.cos() + 0.070257 * t.sin()
            - 0.006758 * (2.0 * t).cos()
            + 0.000907 * (2.0 * t).sin()
            - 0.002697 * (3.0 * t).cos()
            + 0.00148 * (3.0 * t).sin();

        let equation_of_time = 229.18
            * (0.000075 + 0.001868 * t.cos()
                - 0.032077 * t.sin()
                - 0.014615 * (2.0 * t).cos()
                - 0.040849 * (2.0 * t).sin());

        Self {
            declination,
            equation_of_time,
            minutes_of_day: fractional_hour * 60.0,
        }
    }

    /// Hour angle in radians at a longitude (degrees), normalised to
    /// `[-π, π)`.
    fn hour_angle(&self, lon_deg: f64) -> f64 {
        let true_solar_minutes = self.minutes_of_day + self.equation_of_time + 4.0 * lon_deg;
        let mut ha = (true_solar_minutes / 4.0 - 180.0) * PI / 180.0;
        while ha >= PI {
            ha -= 2.0 * PI;
        }
        while ha < -PI {
            ha += 2.0 * PI;
        }
        ha
    }

    /// Instantaneous cosine of the solar zenith angle, clamped at the
    /// horizon.
    pub fn cos_zenith(&self, lat_deg: f64, lon_deg: f64) -> f64 {
        let lat = lat_deg * PI / 180.0;
        let a = lat.sin() * self.declination.sin();
        let b = lat.cos() * self.declination.cos();
        (a + b * self.hour_angle(lon_deg).cos()).max(0.0)
    }

    /// Mean cosine of the solar zenith angle over the `dt_seconds`
    /// preceding this instant, night clipped to zero.
    ///
    /// Declination is treated as constant over the interval.
    pub fn cos_zenith_backwards_mean(&self, lat_deg: f64, lon_deg: f64, dt_seconds: u64) -> f64 {
        let lat = lat_deg * PI / 180.0;
        let a = lat.sin() * self.declination.sin();
        let b = lat.cos() * self.declination.cos();

        let h2 = self.hour_angle(lon_deg);
        let window = dt_seconds as f64 * EARTH_ROTATION;
        let h1 = h2 - window;

        integrate_daylight(a, b, h1, h2) / window
    }

    /// Conversion factor from instantaneous to backward-averaged
    /// radiation: mean over the interval divided by the instantaneous
    /// value. Zero when the sun is below the horizon.
    pub fn backwards_factor(&self, lat_deg: f64, lon_deg: f64, dt_seconds: u64) -> f32 {
        let instant = self.cos_zenith(lat_deg, lon_deg);
        if instant <= 1e-4 {
            return 0.0;
        }
        (self.cos_zenith_backwards_mean(lat_deg, lon_deg, dt_seconds) / instant) as f32
    }
}

/// Integral of `max(0, a + b cos h)` over `[h1, h2]`.
fn integrate_daylight(a: f64, b: f64, h1: f64, h2: f64) -> f64 {
    if a >= b {
        // Polar day: the sun never sets.
        return a * (h2 - h1) + b * (h2.sin() - h1.sin());
    }
    if a <= -b {
        // Polar night.
        return 0.0;
    }

    // Sun is above the horizon for |h - 2πk| < h0.
    let h0 = (-a / b).acos();
    let mut total = 0.0;
    for k in [-1.0, 0.0, 1.0] {
        let lo = h1.max(2.0 * PI * k - h0);
        let hi = h2.min(2.0 * PI * k + h0);
        if hi > lo {
            total += a * (hi - lo) + b * (hi.sin() - lo.sin());
        }
    }
    total
}

/// Per-cell conversion factors for a whole grid at one valid time.
///
/// Returns `mean / instant` per grid point; cells where the sun is at or
/// below the horizon get 0. The caller leaves cells with a factor below
/// its threshold unchanged.
pub fn backwards_factors(grid: &GridDef, time: DateTime<Utc>, dt_seconds: u64) -> Vec<f32> {
    let position = SolarPosition::new(time);
    (0..grid.count())
        .map(|gridpoint| {
            let (lat, lon) = grid.coordinates(gridpoint);
            position.backwards_factor(lat, lon, dt_seconds)
        })
        .collect()
}
