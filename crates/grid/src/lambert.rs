//! Lambert Conformal Conic projection.
//!
//! HRRR CONUS grids are defined on a Lambert Conformal cone. The solar
//! averaging model needs the geographic coordinates of every grid point,
//! so the projection exposes grid-to-geo in addition to geo-to-grid.

use std::f64::consts::PI;

const EARTH_RADIUS: f64 = 6371229.0;

/// Lambert Conformal Conic projection parameters.
#[derive(Debug, Clone)]
pub struct LambertConformal {
    /// Central meridian (LoV) in radians.
    lon0: f64,
    /// First grid point in radians.
    lon1: f64,
    /// Grid spacing in meters.
    dx: f64,
    dy: f64,
    /// Cone constant.
    n: f64,
    /// Projection scale constant.
    f: f64,
    /// Radial distance of the first standard parallel.
    rho0: f64,
    /// Projection coordinates of the first grid point.
    x0: f64,
    y0: f64,
}

impl LambertConformal {
    /// Build a projection from GRIB2 grid definition parameters (degrees
    /// and meters).
    pub fn from_grib2(
        lat1_deg: f64,
        lon1_deg: f64,
        lov_deg: f64,
        latin1_deg: f64,
        latin2_deg: f64,
        dx: f64,
        dy: f64,
    ) -> Self {
        let to_rad = PI / 180.0;
        let lat1 = lat1_deg * to_rad;
        let lon1 = lon1_deg * to_rad;
        let lon0 = lov_deg * to_rad;
        let latin1 = latin1_deg * to_rad;
        let latin2 = latin2_deg * to_rad;

        let n = if (latin1 - latin2).abs() < 1e-10 {
            latin1.sin()
        } else {
            (latin1.cos() / latin2.cos()).ln()
                / ((PI / 4.0 + latin2 / 2.0).tan() / (PI / 4.0 + latin1 / 2.0).tan()).ln()
        };

        let f = (latin1.cos() * (PI / 4.0 + latin1 / 2.0).tan().powf(n)) / n;
        let rho0 = EARTH_RADIUS * f / (PI / 4.0 + lat1 / 2.0).tan().powf(n);

        let theta0 = n * normalize_lon(lon1 - lon0);
        let rho1 = EARTH_RADIUS * f / (PI / 4.0 + lat1 / 2.0).tan().powf(n);
        let x0 = rho1 * theta0.sin();
        let y0 = rho0 - rho1 * theta0.cos();

        Self {
            lon0,
            lon1,
            dx,
            dy,
            n,
            f,
            rho0,
            x0,
            y0,
        }
    }

    /// The HRRR CONUS 3 km projection.
    pub fn hrrr_conus() -> Self {
        Self::from_grib2(
            21.138123,   // lat of first grid point
            -122.719528, // lon of first grid point (237.280472 - 360)
            -97.5,       // LoV (262.5 - 360)
            38.5,
            38.5,
            3000.0,
            3000.0,
        )
    }

    /// Convert geographic coordinates (degrees) to fractional grid indices
    /// `(i, j)`.
    pub fn geo_to_grid(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let to_rad = PI / 180.0;
        let lat = lat_deg * to_rad;
        let lon = lon_deg * to_rad;

        let rho = EARTH_RADIUS * self.f / (PI / 4.0 + lat / 2.0).tan().powf(self.n);
        let theta = self.n * normalize_lon(lon - self.lon0);

        let x = rho * theta.sin();
        let y = self.rho0 - rho * theta.cos();

        ((x - self.x0) / self.dx, (y - self.y0) / self.dy)
    }

    /// Convert fractional grid indices `(i, j)` to geographic coordinates
    /// (degrees).
    pub fn grid_to_geo(&self, i: f64, j: f64) -> (f64, f64) {
        let to_deg = 180.0 / PI;

        let x = self.x0 + i * self.dx;
        let y = self.y0 + j * self.dy;

        let rho = (x * x + (self.rho0 - y) * (self.rho0 - y)).sqrt();
        let rho = if self.n < 0.0 { -rho } else { rho };
        let theta = (x / (self.rho0 - y)).atan();

        let lat = 2.0 * ((EARTH_RADIUS * self.f / rho).powf(1.0 / self.n)).atan() - PI / 2.0;
        let lon = self.lon0 + theta / self.n;

        (lat * to_deg, lon * to_deg)
    }

    /// Longitude of the first grid point in degrees.
    pub fn first_point_lon(&self) -> f64 {
        self.lon1 * 180.0 / PI
    }
}

/// Normalize a longitude difference to `[-π, π]`.
fn normalize_lon(mut dlon: f64) -> f64 {
    while dlon > PI {
        dlon -= 2.0 * PI;
    }
    while dlon < -PI {
        dlon += 2.0 * PI;
    }
    dlon
}
