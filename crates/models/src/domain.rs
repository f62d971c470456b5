//! Forecast product domains.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, DurationRound, Timelike, Utc};
use grid::GridDef;

/// Which product file of a run a variable lives in.
///
/// HRRR splits surface and pressure-level fields into separate files;
/// GFS-family products carry both in one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductFile {
    Surface,
    Pressure,
}

/// One NCEP gridded forecast product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// GFS deterministic 0.25°.
    Gfs025,
    /// GFS deterministic 0.13° (flux files).
    Gfs013,
    /// GEFS ensemble 0.25° (surface subset).
    Gfs025Ens,
    /// GEFS ensemble 0.5°.
    Gfs05Ens,
    /// HRRR CONUS hourly.
    HrrrConus,
    /// HRRR CONUS 15-minute sub-hourly.
    HrrrConus15min,
}

impl Domain {
    pub const ALL: [Domain; 6] = [
        Domain::Gfs025,
        Domain::Gfs013,
        Domain::Gfs025Ens,
        Domain::Gfs05Ens,
        Domain::HrrrConus,
        Domain::HrrrConus15min,
    ];

    /// Stable identifier used in paths and the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            Domain::Gfs025 => "gfs025",
            Domain::Gfs013 => "gfs013",
            Domain::Gfs025Ens => "gfs025_ens",
            Domain::Gfs05Ens => "gfs05_ens",
            Domain::HrrrConus => "hrrr_conus",
            Domain::HrrrConus15min => "hrrr_conus_15min",
        }
    }

    /// Horizontal grid after projection normalisation.
    pub fn grid(&self) -> GridDef {
        match self {
            Domain::Gfs025 | Domain::Gfs025Ens => GridDef::global(1440, 721, 0.25),
            Domain::Gfs013 => GridDef::global(3072, 1536, 0.1171875),
            Domain::Gfs05Ens => GridDef::global(720, 361, 0.5),
            Domain::HrrrConus | Domain::HrrrConus15min => GridDef::hrrr_conus(),
        }
    }

    /// Temporal resolution of the stored time axis in seconds.
    pub fn dt_seconds(&self) -> u64 {
        match self {
            Domain::Gfs025 | Domain::Gfs013 | Domain::HrrrConus => 3600,
            Domain::Gfs025Ens | Domain::Gfs05Ens => 3 * 3600,
            Domain::HrrrConus15min => 900,
        }
    }

    /// Number of forecast runs per day.
    pub fn runs_per_day(&self) -> u32 {
        match self {
            Domain::Gfs025 | Domain::Gfs013 | Domain::Gfs025Ens | Domain::Gfs05Ens => 4,
            Domain::HrrrConus | Domain::HrrrConus15min => 24,
        }
    }

    /// Number of ensemble members, 1 for deterministic products.
    pub fn ensemble_members(&self) -> usize {
        match self {
            Domain::Gfs025Ens | Domain::Gfs05Ens => 31,
            _ => 1,
        }
    }

    /// Pressure levels carried for upper-level variables, hPa.
    pub fn pressure_levels(&self) -> &'static [i32] {
        match self {
            Domain::Gfs025 | Domain::Gfs013 | Domain::HrrrConus | Domain::HrrrConus15min => &[
                50, 100, 150, 200, 250, 300, 400, 500, 600, 700, 850, 925, 1000,
            ],
            Domain::Gfs05Ens => &[50, 100, 200, 250, 300, 500, 700, 850, 925, 1000],
            Domain::Gfs025Ens => &[],
        }
    }

    /// Forecast hours of one run, in ascending order.
    ///
    /// The second flush extends the 0.5° ensemble from hour 384 to 840.
    pub fn forecast_hours(&self, run_hour: u32, second_flush: bool) -> Vec<u32> {
        match self {
            Domain::Gfs025 | Domain::Gfs013 => {
                (0..=120).chain((123..=384).step_by(3)).collect()
            }
            Domain::Gfs025Ens => (0..=240).step_by(3).collect(),
            Domain::Gfs05Ens => {
                let mut hours: Vec<u32> =
                    (0..=240).step_by(3).chain((246..=384).step_by(6)).collect();
                if second_flush {
                    hours.extend((390..=840).step_by(6));
                }
                hours
            }
            Domain::HrrrConus | Domain::HrrrConus15min => {
                let last = if matches!(self, Domain::HrrrConus) && run_hour % 6 == 0 {
                    48
                } else {
                    18
                };
                (0..=last).collect()
            }
        }
    }

    /// How long to keep retrying a run before giving up.
    pub fn deadline(&self) -> chrono::Duration {
        match self {
            Domain::Gfs025 | Domain::Gfs013 => chrono::Duration::hours(4),
            Domain::Gfs025Ens | Domain::Gfs05Ens => chrono::Duration::hours(6),
            Domain::HrrrConus | Domain::HrrrConus15min => chrono::Duration::hours(2),
        }
    }

    /// How long the index may stop advancing before the run is declared
    /// stalled.
    pub fn wait_after_last_modified(&self) -> Duration {
        Duration::from_secs(180)
    }

    /// Time slots per om file (two weeks of steps).
    pub fn n_time_per_chunk(&self) -> usize {
        (14 * 24 * 3600 / self.dt_seconds()) as usize
    }

    /// Store chunk size for single-member variables.
    pub const SCALAR_LOCATIONS_PER_CHUNK: usize = 8;

    /// Rows per store chunk: whole member fans for ensembles.
    pub fn n_locations_per_chunk(&self) -> usize {
        let members = self.ensemble_members();
        if members > 1 {
            members
        } else {
            Self::SCALAR_LOCATIONS_PER_CHUNK
        }
    }

    /// The most recent run at or before `now`, aligned to the run cadence.
    pub fn latest_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let interval = 24 / self.runs_per_day();
        let day = now
            .duration_trunc(chrono::Duration::days(1))
            .expect("day truncation");
        day + chrono::Duration::hours((now.hour() - now.hour() % interval) as i64)
    }

    /// Source URL of one product file on the NOAA open-data buckets.
    ///
    /// `member` is ignored for deterministic products; for ensembles,
    /// member 0 is the control run.
    pub fn url(
        &self,
        run: DateTime<Utc>,
        forecast_hour: u32,
        member: usize,
        file: ProductFile,
    ) -> String {
        let date = format!("{:04}{:02}{:02}", run.year(), run.month(), run.day());
        let hh = run.hour();
        match self {
            Domain::Gfs025 => format!(
                "https://noaa-gfs-bdp-pds.s3.amazonaws.com/gfs.{date}/{hh:02}/atmos/gfs.t{hh:02}z.pgrb2.0p25.f{forecast_hour:03}"
            ),
            Domain::Gfs013 => format!(
                "https://noaa-gfs-bdp-pds.s3.amazonaws.com/gfs.{date}/{hh:02}/atmos/gfs.t{hh:02}z.sfluxgrbf{forecast_hour:03}.grib2"
            ),
            Domain::Gfs025Ens => format!(
                "https://noaa-gefs-pds.s3.amazonaws.com/gefs.{date}/{hh:02}/atmos/pgrb2sp25/{}.t{hh:02}z.pgrb2s.0p25.f{forecast_hour:03}",
                member_token(member)
            ),
            Domain::Gfs05Ens => format!(
                "https://noaa-gefs-pds.s3.amazonaws.com/gefs.{date}/{hh:02}/atmos/pgrb2ap5/{}.t{hh:02}z.pgrb2a.0p50.f{forecast_hour:03}",
                member_token(member)
            ),
            Domain::HrrrConus => {
                let kind = match file {
                    ProductFile::Surface => "wrfsfcf",
                    ProductFile::Pressure => "wrfprsf",
                };
                format!(
                    "https://noaa-hrrr-bdp-pds.s3.amazonaws.com/hrrr.{date}/conus/hrrr.t{hh:02}z.{kind}{forecast_hour:02}.grib2"
                )
            }
            Domain::HrrrConus15min => format!(
                "https://noaa-hrrr-bdp-pds.s3.amazonaws.com/hrrr.{date}/conus/hrrr.t{hh:02}z.wrfsubhf{forecast_hour:02}.grib2"
            ),
        }
    }

    /// Whether the 15-minute sub-hourly schedule applies.
    pub fn is_sub_hourly(&self) -> bool {
        matches!(self, Domain::HrrrConus15min)
    }
}

/// GEFS member file token: control run then perturbations.
fn member_token(member: usize) -> String {
    if member == 0 {
        "gec00".to_string()
    } else {
        format!("gep{:02}", member)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .iter()
            .find(|d| d.name() == s)
            .copied()
            .ok_or_else(|| format!("unknown domain '{}'", s))
    }
}
