//! Variable catalogue.
//!
//! A variable is either a surface field or a pressure-level field. All
//! per-variable behaviour of the pipeline is declared here: the GRIB index
//! selector per domain, quantisation scale factor, unit conversion, gap
//! interpolation kind and the hour-0 rule.

use grid::InterpolationKind;

use crate::domain::{Domain, ProductFile};

/// Surface-level fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceVariable {
    Temperature2m,
    RelativeHumidity2m,
    DewPoint2m,
    PressureMsl,
    CloudCover,
    CloudCoverLow,
    CloudCoverMid,
    CloudCoverHigh,
    Precipitation,
    FrozenPrecipitationPercent,
    SnowDepth,
    WindU10m,
    WindV10m,
    WindU80m,
    WindV80m,
    WindGusts10m,
    Cape,
    LiftedIndex,
    ShortwaveRadiation,
    DiffuseRadiation,
    Visibility,
    SurfaceTemperature,
    /// Aggregated from ensemble member precipitation, never downloaded.
    PrecipitationProbability,
}

/// Pressure-level field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PressureVariableKind {
    Temperature,
    WindU,
    WindV,
    GeopotentialHeight,
    CloudCover,
    RelativeHumidity,
    VerticalVelocity,
}

/// A pressure-level field at one level in hPa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PressureVariable {
    pub kind: PressureVariableKind,
    pub level: i32,
}

/// Tagged union over surface and pressure-level fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    Surface(SurfaceVariable),
    Pressure(PressureVariable),
}

impl SurfaceVariable {
    pub const ALL: [SurfaceVariable; 23] = [
        SurfaceVariable::Temperature2m,
        SurfaceVariable::RelativeHumidity2m,
        SurfaceVariable::DewPoint2m,
        SurfaceVariable::PressureMsl,
        SurfaceVariable::CloudCover,
        SurfaceVariable::CloudCoverLow,
        SurfaceVariable::CloudCoverMid,
        SurfaceVariable::CloudCoverHigh,
        SurfaceVariable::Precipitation,
        SurfaceVariable::FrozenPrecipitationPercent,
        SurfaceVariable::SnowDepth,
        SurfaceVariable::WindU10m,
        SurfaceVariable::WindV10m,
        SurfaceVariable::WindU80m,
        SurfaceVariable::WindV80m,
        SurfaceVariable::WindGusts10m,
        SurfaceVariable::Cape,
        SurfaceVariable::LiftedIndex,
        SurfaceVariable::ShortwaveRadiation,
        SurfaceVariable::DiffuseRadiation,
        SurfaceVariable::Visibility,
        SurfaceVariable::SurfaceTemperature,
        SurfaceVariable::PrecipitationProbability,
    ];

    fn om_file_name(&self) -> &'static str {
        match self {
            SurfaceVariable::Temperature2m => "temperature_2m",
            SurfaceVariable::RelativeHumidity2m => "relative_humidity_2m",
            SurfaceVariable::DewPoint2m => "dew_point_2m",
            SurfaceVariable::PressureMsl => "pressure_msl",
            SurfaceVariable::CloudCover => "cloud_cover",
            SurfaceVariable::CloudCoverLow => "cloud_cover_low",
            SurfaceVariable::CloudCoverMid => "cloud_cover_mid",
            SurfaceVariable::CloudCoverHigh => "cloud_cover_high",
            SurfaceVariable::Precipitation => "precipitation",
            SurfaceVariable::FrozenPrecipitationPercent => "frozen_precipitation_percent",
            SurfaceVariable::SnowDepth => "snow_depth",
            SurfaceVariable::WindU10m => "wind_u_component_10m",
            SurfaceVariable::WindV10m => "wind_v_component_10m",
            SurfaceVariable::WindU80m => "wind_u_component_80m",
            SurfaceVariable::WindV80m => "wind_v_component_80m",
            SurfaceVariable::WindGusts10m => "wind_gusts_10m",
            SurfaceVariable::Cape => "cape",
            SurfaceVariable::LiftedIndex => "lifted_index",
            SurfaceVariable::ShortwaveRadiation => "shortwave_radiation",
            SurfaceVariable::DiffuseRadiation => "diffuse_radiation",
            SurfaceVariable::Visibility => "visibility",
            SurfaceVariable::SurfaceTemperature => "surface_temperature",
            SurfaceVariable::PrecipitationProbability => "precipitation_probability",
        }
    }
}

impl PressureVariableKind {
    pub const ALL: [PressureVariableKind; 7] = [
        PressureVariableKind::Temperature,
        PressureVariableKind::WindU,
        PressureVariableKind::WindV,
        PressureVariableKind::GeopotentialHeight,
        PressureVariableKind::CloudCover,
        PressureVariableKind::RelativeHumidity,
        PressureVariableKind::VerticalVelocity,
    ];

    /// Base name without the level suffix.
    pub fn base_name(&self) -> &'static str {
        match self {
            PressureVariableKind::Temperature => "temperature",
            PressureVariableKind::WindU => "wind_u_component",
            PressureVariableKind::WindV => "wind_v_component",
            PressureVariableKind::GeopotentialHeight => "geopotential_height",
            PressureVariableKind::CloudCover => "cloud_cover",
            PressureVariableKind::RelativeHumidity => "relative_humidity",
            PressureVariableKind::VerticalVelocity => "vertical_velocity",
        }
    }
}

impl Variable {
    /// File-system name of the variable's store files.
    pub fn om_file_name(&self) -> String {
        match self {
            Variable::Surface(v) => v.om_file_name().to_string(),
            Variable::Pressure(p) => format!("{}_{}hPa", p.kind.base_name(), p.level),
        }
    }

    /// Quantisation scale factor for the compressed store.
    pub fn scalefactor(&self) -> f32 {
        match self {
            Variable::Surface(v) => match v {
                SurfaceVariable::Temperature2m
                | SurfaceVariable::DewPoint2m
                | SurfaceVariable::SurfaceTemperature => 20.0,
                SurfaceVariable::RelativeHumidity2m
                | SurfaceVariable::CloudCover
                | SurfaceVariable::CloudCoverLow
                | SurfaceVariable::CloudCoverMid
                | SurfaceVariable::CloudCoverHigh
                | SurfaceVariable::FrozenPrecipitationPercent
                | SurfaceVariable::PrecipitationProbability => 1.0,
                SurfaceVariable::PressureMsl => 10.0,
                SurfaceVariable::Precipitation => 10.0,
                SurfaceVariable::SnowDepth => 100.0,
                SurfaceVariable::WindU10m
                | SurfaceVariable::WindV10m
                | SurfaceVariable::WindU80m
                | SurfaceVariable::WindV80m
                | SurfaceVariable::WindGusts10m => 10.0,
                SurfaceVariable::Cape => 0.1,
                SurfaceVariable::LiftedIndex => 10.0,
                SurfaceVariable::ShortwaveRadiation | SurfaceVariable::DiffuseRadiation => 1.0,
                SurfaceVariable::Visibility => 0.05,
            },
            Variable::Pressure(p) => match p.kind {
                PressureVariableKind::Temperature => 20.0,
                PressureVariableKind::WindU | PressureVariableKind::WindV => 10.0,
                PressureVariableKind::GeopotentialHeight => 1.0,
                PressureVariableKind::CloudCover => 1.0,
                PressureVariableKind::RelativeHumidity => 1.0,
                PressureVariableKind::VerticalVelocity => 20.0,
            },
        }
    }

    /// How scheduled time gaps are filled after transposition.
    pub fn interpolation(&self) -> InterpolationKind {
        match self {
            Variable::Surface(v) => match v {
                SurfaceVariable::Precipitation => InterpolationKind::BackwardsSum,
                SurfaceVariable::FrozenPrecipitationPercent => InterpolationKind::Backwards,
                SurfaceVariable::ShortwaveRadiation | SurfaceVariable::DiffuseRadiation => {
                    InterpolationKind::SolarBackwardsAveraged
                }
                SurfaceVariable::CloudCover
                | SurfaceVariable::CloudCoverLow
                | SurfaceVariable::CloudCoverMid
                | SurfaceVariable::CloudCoverHigh
                | SurfaceVariable::Visibility
                | SurfaceVariable::SnowDepth
                | SurfaceVariable::PrecipitationProbability => InterpolationKind::Linear,
                _ => InterpolationKind::Hermite,
            },
            Variable::Pressure(p) => match p.kind {
                PressureVariableKind::CloudCover | PressureVariableKind::RelativeHumidity => {
                    InterpolationKind::Linear
                }
                _ => InterpolationKind::Hermite,
            },
        }
    }

    /// Linear unit conversion `x·a + b` applied after the semantic steps.
    pub fn multiply_add(&self, _domain: Domain) -> Option<(f32, f32)> {
        match self {
            Variable::Surface(SurfaceVariable::Temperature2m)
            | Variable::Surface(SurfaceVariable::DewPoint2m)
            | Variable::Surface(SurfaceVariable::SurfaceTemperature) => Some((1.0, -273.15)),
            // Pa to hPa.
            Variable::Surface(SurfaceVariable::PressureMsl) => Some((1.0 / 100.0, 0.0)),
            // PRATE kg/m²/s to mm/h.
            Variable::Surface(SurfaceVariable::Precipitation) => Some((3600.0, 0.0)),
            // Meters to kilometers.
            Variable::Surface(SurfaceVariable::Visibility) => Some((1.0 / 1000.0, 0.0)),
            Variable::Pressure(p) if p.kind == PressureVariableKind::Temperature => {
                Some((1.0, -273.15))
            }
            _ => None,
        }
    }

    /// Whether the variable has no meaningful value at forecast hour 0.
    ///
    /// Averaged and rate fields describe the interval preceding a step,
    /// which does not exist for the analysis step.
    pub fn skip_hour_0(&self, _domain: Domain) -> bool {
        matches!(
            self,
            Variable::Surface(SurfaceVariable::Precipitation)
                | Variable::Surface(SurfaceVariable::ShortwaveRadiation)
                | Variable::Surface(SurfaceVariable::DiffuseRadiation)
                | Variable::Surface(SurfaceVariable::FrozenPrecipitationPercent)
                | Variable::Surface(SurfaceVariable::PrecipitationProbability)
        )
    }

    /// Whether frames are kept in the per-pass memory cache for
    /// downstream conversions.
    pub fn keep_in_memory(&self, domain: Domain) -> bool {
        match (self, domain) {
            (
                Variable::Surface(SurfaceVariable::Temperature2m)
                | Variable::Surface(SurfaceVariable::PressureMsl),
                Domain::Gfs013,
            ) => true,
            (Variable::Pressure(p), Domain::HrrrConus | Domain::Gfs05Ens) => {
                p.kind == PressureVariableKind::Temperature
            }
            _ => false,
        }
    }

    /// Whether the variable is persisted at all. Cache-only prerequisites
    /// are downloaded but never written.
    pub fn written_to_disk(&self, domain: Domain) -> bool {
        !matches!(
            (self, domain),
            (Variable::Surface(SurfaceVariable::PressureMsl), Domain::Gfs013)
        )
    }

    /// Number of stored realisations: the domain's member fan, except
    /// for fields aggregated across members.
    pub fn n_members(&self, domain: Domain) -> usize {
        if matches!(
            self,
            Variable::Surface(SurfaceVariable::PrecipitationProbability)
        ) {
            1
        } else {
            domain.ensemble_members()
        }
    }

    /// Which product file of the domain carries the variable.
    pub fn product_file(&self) -> ProductFile {
        match self {
            Variable::Surface(_) => ProductFile::Surface,
            Variable::Pressure(_) => ProductFile::Pressure,
        }
    }

    /// Selector substring matched against GRIB index records, or `None`
    /// when the domain does not carry the variable.
    pub fn grib_index_name(&self, domain: Domain) -> Option<String> {
        match self {
            Variable::Surface(v) => surface_index_name(*v, domain).map(str::to_string),
            Variable::Pressure(p) => {
                if !domain.pressure_levels().contains(&p.level) {
                    return None;
                }
                let short = match (p.kind, domain) {
                    (PressureVariableKind::Temperature, _) => "TMP",
                    (PressureVariableKind::WindU, _) => "UGRD",
                    (PressureVariableKind::WindV, _) => "VGRD",
                    (PressureVariableKind::GeopotentialHeight, _) => "HGT",
                    (PressureVariableKind::CloudCover, Domain::Gfs025) => "TCDC",
                    (PressureVariableKind::CloudCover, _) => return None,
                    (PressureVariableKind::RelativeHumidity, _) => "RH",
                    // GFS 0.25° carries geometric vertical velocity
                    // directly; HRRR and the 0.5° ensemble report ω.
                    (PressureVariableKind::VerticalVelocity, Domain::Gfs025) => "DZDT",
                    (
                        PressureVariableKind::VerticalVelocity,
                        Domain::HrrrConus | Domain::Gfs05Ens,
                    ) => "VVEL",
                    (PressureVariableKind::VerticalVelocity, _) => return None,
                };
                Some(format!(":{}:{} mb:", short, p.level))
            }
        }
    }
}

/// Surface selector table. `None` means the domain does not carry the
/// variable (or, for the probability aggregate, that it is computed, not
/// downloaded).
fn surface_index_name(variable: SurfaceVariable, domain: Domain) -> Option<&'static str> {
    use Domain::*;
    use SurfaceVariable::*;

    match (variable, domain) {
        (Temperature2m, _) => Some(":TMP:2 m above ground:"),

        // The 0.13° flux files carry specific instead of relative
        // humidity; the pipeline converts using cached temperature and
        // pressure.
        (RelativeHumidity2m, Gfs013) => Some(":SPFH:2 m above ground:"),
        (RelativeHumidity2m, _) => Some(":RH:2 m above ground:"),

        (DewPoint2m, Gfs025 | Gfs025Ens | HrrrConus) => Some(":DPT:2 m above ground:"),
        (DewPoint2m, _) => None,

        (PressureMsl, Gfs025 | Gfs013 | Gfs025Ens | Gfs05Ens | HrrrConus) => {
            Some(":PRMSL:mean sea level:")
        }
        (PressureMsl, HrrrConus15min) => None,

        (CloudCover, Gfs025 | Gfs013 | Gfs025Ens | HrrrConus) => {
            Some(":TCDC:entire atmosphere:")
        }
        (CloudCover, _) => None,
        (CloudCoverLow, Gfs025 | Gfs013 | HrrrConus) => Some(":LCDC:low cloud layer:"),
        (CloudCoverLow, _) => None,
        (CloudCoverMid, Gfs025 | Gfs013 | HrrrConus) => Some(":MCDC:middle cloud layer:"),
        (CloudCoverMid, _) => None,
        (CloudCoverHigh, Gfs025 | Gfs013 | HrrrConus) => Some(":HCDC:high cloud layer:"),
        (CloudCoverHigh, _) => None,

        // Precipitation rate, average type; deaveraged then scaled to
        // mm/h. Ensembles get probability from the aggregator instead.
        (Precipitation, Gfs025 | Gfs013 | HrrrConus | HrrrConus15min) => Some(":PRATE:surface:"),
        (Precipitation, _) => None,

        (FrozenPrecipitationPercent, Gfs025 | Gfs013 | HrrrConus) => Some(":CPOFP:surface:"),
        (FrozenPrecipitationPercent, _) => None,

        (SnowDepth, Gfs025 | Gfs013 | HrrrConus) => Some(":SNOD:surface:"),
        (SnowDepth, _) => None,

        (WindU10m, _) => Some(":UGRD:10 m above ground:"),
        (WindV10m, _) => Some(":VGRD:10 m above ground:"),
        (WindU80m, Gfs025 | Gfs013 | HrrrConus) => Some(":UGRD:80 m above ground:"),
        (WindU80m, _) => None,
        (WindV80m, Gfs025 | Gfs013 | HrrrConus) => Some(":VGRD:80 m above ground:"),
        (WindV80m, _) => None,

        (WindGusts10m, Gfs025 | Gfs025Ens | Gfs05Ens | HrrrConus | HrrrConus15min) => {
            Some(":GUST:surface:")
        }
        (WindGusts10m, Gfs013) => None,

        (Cape, Gfs025 | Gfs013 | Gfs05Ens | HrrrConus) => Some(":CAPE:surface:"),
        (Cape, _) => None,
        (LiftedIndex, Gfs025 | HrrrConus) => Some(":LFTX:surface:"),
        (LiftedIndex, _) => None,

        (ShortwaveRadiation, _) => Some(":DSWRF:surface:"),
        (DiffuseRadiation, HrrrConus | HrrrConus15min) => Some(":VDDSF:surface:"),
        (DiffuseRadiation, _) => None,

        (Visibility, Gfs025 | Gfs013 | HrrrConus | HrrrConus15min) => Some(":VIS:surface:"),
        (Visibility, _) => None,

        (SurfaceTemperature, Gfs025 | Gfs013 | HrrrConus) => Some(":TMP:surface:"),
        (SurfaceTemperature, _) => None,

        (PrecipitationProbability, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_om_file_names() {
        assert_eq!(
            Variable::Surface(SurfaceVariable::Temperature2m).om_file_name(),
            "temperature_2m"
        );
        let v = Variable::Pressure(PressureVariable {
            kind: PressureVariableKind::Temperature,
            level: 850,
        });
        assert_eq!(v.om_file_name(), "temperature_850hPa");
    }

    #[test]
    fn test_gfs013_humidity_is_specific() {
        let rh = Variable::Surface(SurfaceVariable::RelativeHumidity2m);
        assert_eq!(
            rh.grib_index_name(Domain::Gfs013).unwrap(),
            ":SPFH:2 m above ground:"
        );
        assert_eq!(
            rh.grib_index_name(Domain::Gfs025).unwrap(),
            ":RH:2 m above ground:"
        );
    }

    #[test]
    fn test_gfs013_cache_only_pressure() {
        let p = Variable::Surface(SurfaceVariable::PressureMsl);
        assert!(p.keep_in_memory(Domain::Gfs013));
        assert!(!p.written_to_disk(Domain::Gfs013));
        assert!(p.written_to_disk(Domain::Gfs025));
    }

    #[test]
    fn test_vertical_velocity_selector_by_domain() {
        let v = Variable::Pressure(PressureVariable {
            kind: PressureVariableKind::VerticalVelocity,
            level: 500,
        });
        assert_eq!(v.grib_index_name(Domain::Gfs025).unwrap(), ":DZDT:500 mb:");
        assert_eq!(v.grib_index_name(Domain::HrrrConus).unwrap(), ":VVEL:500 mb:");
        assert_eq!(v.grib_index_name(Domain::Gfs025Ens), None);
    }

    #[test]
    fn test_pressure_level_filtered_by_domain() {
        let v = Variable::Pressure(PressureVariable {
            kind: PressureVariableKind::Temperature,
            level: 150,
        });
        assert!(v.grib_index_name(Domain::Gfs025).is_some());
        // 150 hPa is not in the 0.5° ensemble level set.
        assert!(v.grib_index_name(Domain::Gfs05Ens).is_none());
    }

    #[test]
    fn test_skip_hour_0() {
        assert!(Variable::Surface(SurfaceVariable::Precipitation).skip_hour_0(Domain::Gfs025));
        assert!(!Variable::Surface(SurfaceVariable::Temperature2m).skip_hour_0(Domain::Gfs025));
    }

    #[test]
    fn test_probability_is_single_member() {
        let p = Variable::Surface(SurfaceVariable::PrecipitationProbability);
        assert_eq!(p.n_members(Domain::Gfs025Ens), 1);
        let t = Variable::Surface(SurfaceVariable::Temperature2m);
        assert_eq!(t.n_members(Domain::Gfs025Ens), 31);
        assert_eq!(t.n_members(Domain::Gfs025), 1);
    }

    #[test]
    fn test_hrrr_pressure_temperature_cached() {
        let t = Variable::Pressure(PressureVariable {
            kind: PressureVariableKind::Temperature,
            level: 700,
        });
        assert!(t.keep_in_memory(Domain::HrrrConus));
        assert!(!t.keep_in_memory(Domain::Gfs025));
    }
}
