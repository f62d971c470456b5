//! Reader-side derived variables.
//!
//! Pure, stateless functions the query layer composes from stored base
//! variables. Nothing here touches the column store.

use crate::meteorology;

/// Wind speed from zonal and meridional components.
pub fn wind_speed(u: f32, v: f32) -> f32 {
    (u * u + v * v).sqrt()
}

/// Meteorological wind direction in degrees, [0, 360).
///
/// Direction the wind blows from: 0° = from north, 90° = from east.
pub fn wind_direction(u: f32, v: f32) -> f32 {
    let deg = (-u).atan2(-v).to_degrees();
    if deg < 0.0 {
        deg + 360.0
    } else {
        deg
    }
}

/// Relative humidity for queries: the stored humidity value when the
/// domain carries one, otherwise an estimate from stored cloud cover.
pub fn relative_humidity_fallback(humidity: Option<f32>, cloud_cover: f32) -> f32 {
    match humidity {
        Some(rh) if !rh.is_nan() => rh.clamp(0.0, 100.0),
        _ => relative_humidity_from_cloud_cover(cloud_cover),
    }
}

/// Coarse humidity estimate from total cloud cover in percent: overcast
/// skies imply near-saturated air, clear skies a dry floor.
pub fn relative_humidity_from_cloud_cover(cloud_cover: f32) -> f32 {
    (30.0 + 0.7 * cloud_cover.clamp(0.0, 100.0)).clamp(0.0, 100.0)
}

/// Relative humidity from stored dew point and temperature, for callers
/// that want the thermodynamic value instead of the cloud-cover estimate.
pub fn relative_humidity_from_dewpoint(dewpoint_c: f32, temperature_c: f32) -> f32 {
    meteorology::dewpoint_to_relative_humidity(dewpoint_c, temperature_c)
}

/// Daily maxima from a 6-hourly series (groups of 4 steps).
pub fn daily_max(series: &[f32]) -> Vec<f32> {
    aggregate_by_4(series, |day| {
        day.iter().copied().fold(f32::NAN, f32::max)
    })
}

/// Daily minima from a 6-hourly series.
pub fn daily_min(series: &[f32]) -> Vec<f32> {
    aggregate_by_4(series, |day| {
        day.iter().copied().fold(f32::NAN, f32::min)
    })
}

/// Daily sums from a 6-hourly series.
pub fn daily_sum(series: &[f32]) -> Vec<f32> {
    aggregate_by_4(series, |day| day.iter().sum())
}

/// Hours with precipitation above 0.001 mm, per day of 6-hourly steps.
pub fn precipitation_hours(series: &[f32]) -> Vec<f32> {
    aggregate_by_4(series, |day| {
        day.iter().filter(|&&p| p > 0.001).count() as f32
    })
}

/// Daily shortwave radiation sum in MJ/m² from 6-hourly averages in W/m².
///
/// Each step is an average over 6 hours: W/m² · 0.0036 · 6 = MJ/m².
pub fn shortwave_radiation_sum(series: &[f32]) -> Vec<f32> {
    aggregate_by_4(series, |day| {
        day.iter().map(|&x| x * 0.0036 * 6.0).sum()
    })
}

fn aggregate_by_4<F: Fn(&[f32]) -> f32>(series: &[f32], f: F) -> Vec<f32> {
    series.chunks(4).map(|day| f(day)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wind_speed() {
        assert_eq!(wind_speed(3.0, 4.0), 5.0);
        assert_eq!(wind_speed(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_wind_direction_cardinal() {
        // Wind from the north blows southward: v negative.
        assert!((wind_direction(0.0, -5.0) - 0.0).abs() < 1e-4);
        // From the east: u negative.
        assert!((wind_direction(-5.0, 0.0) - 90.0).abs() < 1e-4);
        // From the south.
        assert!((wind_direction(0.0, 5.0) - 180.0).abs() < 1e-4);
        // From the west.
        assert!((wind_direction(5.0, 0.0) - 270.0).abs() < 1e-4);
    }

    #[test]
    fn test_wind_direction_range() {
        for (u, v) in [(1.0, 1.0), (-1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)] {
            let d = wind_direction(u, v);
            assert!((0.0..360.0).contains(&d), "u={} v={} d={}", u, v, d);
        }
    }

    #[test]
    fn test_relative_humidity_fallback_prefers_stored_value() {
        assert_eq!(relative_humidity_fallback(Some(55.0), 100.0), 55.0);
        assert_eq!(relative_humidity_fallback(Some(120.0), 0.0), 100.0);
    }

    #[test]
    fn test_relative_humidity_fallback_uses_cloud_cover() {
        // Missing or NaN humidity falls back to the cloud-cover estimate.
        assert_eq!(relative_humidity_fallback(None, 100.0), 100.0);
        assert_eq!(relative_humidity_fallback(Some(f32::NAN), 0.0), 30.0);
        let mid = relative_humidity_fallback(None, 50.0);
        assert!((mid - 65.0).abs() < 1e-4);
    }

    #[test]
    fn test_daily_aggregations() {
        let series = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        assert_eq!(daily_max(&series), vec![4.0, 8.0]);
        assert_eq!(daily_min(&series), vec![1.0, 5.0]);
        assert_eq!(daily_sum(&series), vec![10.0, 26.0]);
    }

    #[test]
    fn test_precipitation_hours() {
        let series = [0.0, 0.5, 0.0005, 2.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(precipitation_hours(&series), vec![2.0, 0.0]);
    }

    #[test]
    fn test_shortwave_radiation_sum() {
        // Constant 100 W/m² over a day: 100 · 0.0036 · 6 · 4 = 8.64 MJ/m².
        let series = [100.0; 4];
        let sums = shortwave_radiation_sum(&series);
        assert!((sums[0] - 8.64).abs() < 1e-4);
    }
}
