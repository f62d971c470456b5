//! Pure meteorological conversions shared by the ingest pipeline and the
//! query layer.

/// Specific gas constant of dry air, J/(kg·K).
pub const DRY_AIR_GAS_CONSTANT: f32 = 287.058;

/// Standard gravity, m/s².
pub const GRAVITY: f32 = 9.80665;

/// Saturation vapour pressure in hPa over liquid water (Magnus formula),
/// temperature in °C.
pub fn saturation_vapour_pressure(temperature_c: f32) -> f32 {
    6.112 * ((17.62 * temperature_c) / (243.12 + temperature_c)).exp()
}

/// Relative humidity in percent from specific humidity.
///
/// `specific_humidity` in g/kg, `temperature_c` in °C, `pressure_hpa` in
/// hPa. The result is clamped to [0, 100].
pub fn specific_to_relative_humidity(
    specific_humidity: f32,
    temperature_c: f32,
    pressure_hpa: f32,
) -> f32 {
    let q = specific_humidity / 1000.0;
    // Vapour pressure from specific humidity, hPa.
    let vapour_pressure = q * pressure_hpa / (0.622 + 0.378 * q);
    let rh = 100.0 * vapour_pressure / saturation_vapour_pressure(temperature_c);
    rh.clamp(0.0, 100.0)
}

/// Relative humidity in percent from dew point, both in °C.
pub fn dewpoint_to_relative_humidity(dewpoint_c: f32, temperature_c: f32) -> f32 {
    let rh = 100.0 * saturation_vapour_pressure(dewpoint_c)
        / saturation_vapour_pressure(temperature_c);
    rh.clamp(0.0, 100.0)
}

/// Convert pressure vertical velocity ω (Pa/s) to geometric vertical
/// velocity w (m/s) assuming hydrostatic balance.
///
/// `temperature_k` in Kelvin, `pressure_pa` in Pa. Positive w is upward.
pub fn omega_to_vertical_velocity(omega_pa_s: f32, temperature_k: f32, pressure_pa: f32) -> f32 {
    -omega_pa_s * DRY_AIR_GAS_CONSTANT * temperature_k / (pressure_pa * GRAVITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturation_vapour_pressure_at_zero() {
        // 6.112 hPa at 0 °C by construction.
        assert!((saturation_vapour_pressure(0.0) - 6.112).abs() < 1e-4);
    }

    #[test]
    fn test_saturation_vapour_pressure_increases() {
        assert!(saturation_vapour_pressure(30.0) > saturation_vapour_pressure(10.0));
    }

    #[test]
    fn test_specific_to_relative_humidity_bounds() {
        for q in [0.0, 1.0, 5.0, 20.0, 50.0] {
            let rh = specific_to_relative_humidity(q, 20.0, 1013.25);
            assert!((0.0..=100.0).contains(&rh), "q={} rh={}", q, rh);
        }
    }

    #[test]
    fn test_specific_to_relative_humidity_plausible() {
        // ~10 g/kg at 20 °C and sea level is in the 65-75 % range.
        let rh = specific_to_relative_humidity(10.0, 20.0, 1013.25);
        assert!(rh > 60.0 && rh < 80.0, "rh={}", rh);
    }

    #[test]
    fn test_dewpoint_equal_temperature_is_saturated() {
        assert!((dewpoint_to_relative_humidity(15.0, 15.0) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_omega_sign_flip() {
        // Sinking air (positive omega) is negative w.
        let w = omega_to_vertical_velocity(1.0, 280.0, 85000.0);
        assert!(w < 0.0);
        // 1 Pa/s at 850 hPa and 280 K is roughly -0.096 m/s.
        assert!((w + 0.0964).abs() < 0.001, "w={}", w);
    }
}
