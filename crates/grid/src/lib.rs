//! Grid geometry and numerics for gridded forecast products.
//!
//! Provides the dense 2-D array type used for decoded GRIB2 frames,
//! projections (regular lat/lon and Lambert Conformal), time-series gap
//! interpolation, the solar position model used for radiation averaging,
//! and pure meteorological conversions.

pub mod array2d;
pub mod derived;
pub mod interpolation;
pub mod lambert;
pub mod meteorology;
pub mod zensun;

mod griddef;

pub use array2d::Array2D;
pub use griddef::{GridDef, GridProjection};
pub use interpolation::InterpolationKind;
pub use lambert::LambertConformal;
